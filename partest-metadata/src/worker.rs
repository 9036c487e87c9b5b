// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};

/// The byte a long-lived worker appends to its marker file after finishing each unit.
///
/// partest compares the length of the marker file against the number of units it has sent to
/// decide whether the worker is free.
pub const WORKER_MARKER: u8 = b'.';

/// A request sent to a long-lived engine worker, one JSON document per line on its stdin.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WorkerRequest {
    /// Run a single unit with these arguments.
    ///
    /// The arguments have the same shape as the arguments passed to an engine process that runs
    /// one unit, without the engine binary itself.
    Run {
        /// Arguments for the unit.
        args: Vec<String>,
    },

    /// Finish up and exit.
    Exit,
}

impl WorkerRequest {
    /// Serializes the request as a single line, including the trailing newline.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parses a request from a single line, ignoring surrounding whitespace.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}
