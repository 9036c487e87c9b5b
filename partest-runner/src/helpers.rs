// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for partest-runner.

use std::{fmt, time::Duration};

/// Joins items as a comma-separated list of backtick-quoted strings.
pub(crate) fn join_quoted<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("`{item}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Utilities for pluralizing various words based on count.
pub(crate) mod plural {
    /// Returns "unit" if `count` is 1, otherwise "units".
    pub(crate) fn units_str(count: usize) -> &'static str {
        if count == 1 { "unit" } else { "units" }
    }

    /// Returns "test" if `count` is 1, otherwise "tests".
    pub(crate) fn tests_str(count: usize) -> &'static str {
        if count == 1 { "test" } else { "tests" }
    }

    /// Returns "process" if `count` is 1, otherwise "processes".
    pub(crate) fn processes_str(count: usize) -> &'static str {
        if count == 1 { "process" } else { "processes" }
    }
}

/// Displays an exit code, or the lack of one.
pub(crate) struct DisplayExitCode(pub(crate) Option<i32>);

impl fmt::Display for DisplayExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "no exit code (terminated by a signal)"),
        }
    }
}

/// Displays a duration as seconds with two decimal places, e.g. `0.42s`.
pub(crate) struct DisplaySeconds(pub(crate) Duration);

impl fmt::Display for DisplaySeconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}s", self.0.as_secs_f64())
    }
}
