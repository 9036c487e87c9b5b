// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forwarding worker output to the run's stdout.
//!
//! An engine prints, for each unit, a progress section, then details about failures, then its
//! own recap. Sections are separated by blank lines. Progress is forwarded as soon as a unit is
//! torn down; failure details are deferred until every unit has finished, so they appear
//! together above the run's recap; the engine's per-unit recap is dropped.

use crate::write_str::WriteStr;
use std::io;

/// The marker engines print when a unit contained no tests.
pub const NO_TESTS_EXECUTED: &str = "No tests executed!";

/// How a single blob of worker stdout is split.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SplitOutput<'a> {
    /// Written as soon as the unit is torn down.
    pub immediate: &'a str,

    /// Buffered until the end of the run.
    pub deferred: Option<&'a str>,
}

impl<'a> SplitOutput<'a> {
    /// Splits `content` at its blank lines.
    ///
    /// With fewer than two blank lines, everything is immediate. Otherwise the text before the
    /// second blank line is immediate. If there are more than three blank lines, the text from
    /// the second blank line up to the second-to-last one is deferred. The rest is dropped.
    pub fn new(content: &'a str) -> Self {
        let blank_lines = blank_line_positions(content);
        if blank_lines.len() < 2 {
            return Self {
                immediate: content,
                deferred: None,
            };
        }

        let second = blank_lines[1];
        let deferred = (blank_lines.len() > 3)
            .then(|| &content[second..blank_lines[blank_lines.len() - 2]]);
        Self {
            immediate: &content[..second],
            deferred,
        }
    }
}

/// Returns the byte offsets of every empty line in `content`.
///
/// An empty line starts at offset `i` if `content[i]` is a newline at the start of a line.
fn blank_line_positions(content: &str) -> Vec<usize> {
    let bytes = content.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|&(i, &b)| b == b'\n' && (i == 0 || bytes[i - 1] == b'\n'))
        .map(|(i, _)| i)
        .collect()
}

/// Splits worker stdout into immediate and deferred output.
///
/// Deferred fragments are kept in completion order and written by [`Self::flush_deferred`].
#[derive(Clone, Debug, Default)]
pub struct OutputMultiplexer {
    deferred: Vec<String>,
}

impl OutputMultiplexer {
    /// Creates a multiplexer with nothing deferred.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles the captured stdout of one unit.
    ///
    /// Empty output, and output reporting that no tests ran, is ignored.
    pub fn handle(&mut self, content: &str, out: &mut dyn WriteStr) -> io::Result<()> {
        if content.is_empty() || content.contains(NO_TESTS_EXECUTED) {
            return Ok(());
        }

        let split = SplitOutput::new(content);
        out.write_str(split.immediate)?;
        if let Some(deferred) = split.deferred {
            self.deferred.push(deferred.to_owned());
        }
        Ok(())
    }

    #[cfg(test)]
    fn deferred(&self) -> &[String] {
        &self.deferred
    }

    /// Writes out and clears every deferred fragment.
    pub fn flush_deferred(&mut self, out: &mut dyn WriteStr) -> io::Result<()> {
        for fragment in self.deferred.drain(..) {
            out.write_str(&fragment)?;
        }
        out.write_str_flush()
    }
}
