// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{aggregator::ExitCategory, errors::StopPolicyParseError};
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// When the scheduler discards the pending queue.
///
/// Units that are already running are never interrupted: they finish and are torn down normally.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopPolicy {
    /// Run every unit.
    #[default]
    Never,

    /// Stop handing out units once any unit fails or errors.
    OnFailure,

    /// Stop handing out units once any unit errors.
    OnError,
}

impl StopPolicy {
    /// Returns string representations of all known variants.
    pub fn variants() -> &'static [&'static str] {
        &["never", "on-failure", "on-error"]
    }

    /// Returns true if pending units should be discarded once `highest` has been observed.
    pub fn should_stop(self, highest: ExitCategory) -> bool {
        match self {
            Self::Never => false,
            Self::OnFailure => highest >= ExitCategory::Failure,
            Self::OnError => highest >= ExitCategory::Error,
        }
    }

    /// Returns the engine flag that asks the engine to apply the same policy within a unit.
    pub fn engine_flag(self) -> Option<&'static str> {
        match self {
            Self::Never => None,
            Self::OnFailure => Some("--stop-on-failure"),
            Self::OnError => Some("--stop-on-error"),
        }
    }
}

impl FromStr for StopPolicy {
    type Err = StopPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "on-failure" => Ok(Self::OnFailure),
            "on-error" => Ok(Self::OnError),
            other => Err(StopPolicyParseError::new(other)),
        }
    }
}

impl fmt::Display for StopPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => write!(f, "never"),
            Self::OnFailure => write!(f, "on-failure"),
            Self::OnError => write!(f, "on-error"),
        }
    }
}

/// How engine processes are managed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerMode {
    /// A fresh engine process is spawned for every unit.
    #[default]
    Spawn,

    /// Each slot keeps one long-lived engine worker and sends it units over stdin.
    Reuse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(StopPolicy::Never, ExitCategory::Crash, false ; "never stops")]
    #[test_case(StopPolicy::OnFailure, ExitCategory::Success, false ; "failure policy on success")]
    #[test_case(StopPolicy::OnFailure, ExitCategory::Failure, true ; "failure policy on failure")]
    #[test_case(StopPolicy::OnFailure, ExitCategory::Error, true ; "failure policy on error")]
    #[test_case(StopPolicy::OnError, ExitCategory::Failure, false ; "error policy on failure")]
    #[test_case(StopPolicy::OnError, ExitCategory::Error, true ; "error policy on error")]
    fn should_stop(policy: StopPolicy, highest: ExitCategory, expected: bool) {
        assert_eq!(policy.should_stop(highest), expected);
    }

    #[test]
    fn round_trips_through_display() {
        for variant in StopPolicy::variants() {
            let policy: StopPolicy = variant.parse().expect("known variant");
            assert_eq!(policy.to_string(), *variant);
        }
    }
}
