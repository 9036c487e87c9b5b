// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable output produced by partest itself, as opposed to output forwarded from
//! workers.

use crate::{
    aggregator::RunTotals,
    helpers::{
        DisplaySeconds,
        plural::{processes_str, tests_str, units_str},
    },
    output::NO_TESTS_EXECUTED,
    unit::InventoryStatus,
    write_str::WriteStr,
};
use owo_colors::{OwoColorize, Style};
use std::{io, time::Duration};

/// Writes the header, recap and other run-level messages.
#[derive(Clone, Debug, Default)]
pub struct Reporter {
    styles: Styles,
}

impl Reporter {
    /// Creates a new reporter, colorized if `colorize` is true.
    pub fn new(colorize: bool) -> Self {
        let mut styles = Styles::default();
        if colorize {
            styles.colorize();
        }
        Self { styles }
    }

    #[cfg(test)]
    fn is_colorized(&self) -> bool {
        self.styles.is_colorized
    }

    /// Writes the message for a run with nothing to execute.
    pub fn write_nothing_to_run(
        &self,
        status: InventoryStatus,
        out: &mut dyn WriteStr,
    ) -> io::Result<()> {
        match status {
            InventoryStatus::AllFiltered { discovered } => writeln!(
                out,
                "\n  No units matched the given filters ({} discovered)\n",
                discovered.style(self.styles.count),
            ),
            InventoryStatus::Empty | InventoryStatus::Found => {
                writeln!(out, "\n  {NO_TESTS_EXECUTED}\n")
            }
        }
    }

    /// Writes the line announcing the run.
    pub fn write_header(
        &self,
        units: usize,
        tests: usize,
        processes: usize,
        seed: Option<u64>,
        out: &mut dyn WriteStr,
    ) -> io::Result<()> {
        write!(
            out,
            "\n  {} {} {} ({} {}) using {} {}",
            "Running".style(self.styles.heading),
            units.style(self.styles.count),
            units_str(units),
            tests.style(self.styles.count),
            tests_str(tests),
            processes.style(self.styles.count),
            processes_str(processes),
        )?;
        if let Some(seed) = seed {
            write!(out, " (random order, seed {})", seed.style(self.styles.count))?;
        }
        writeln!(out, "\n")
    }

    /// Writes the command line used to launch a unit. Shown in very verbose mode.
    pub fn write_launch(&self, command_line: &str, out: &mut dyn WriteStr) -> io::Result<()> {
        writeln!(
            out,
            "\n{} {command_line}",
            "Executing unit via:".style(self.styles.heading)
        )
    }

    /// Writes the run's recap: counts by outcome, then the elapsed time.
    ///
    /// Categories with a zero count are left out. Errors are counted as failures.
    pub fn write_recap(
        &self,
        totals: &RunTotals,
        elapsed: Duration,
        out: &mut dyn WriteStr,
    ) -> io::Result<()> {
        let failed = totals.failed + totals.errored;
        let parts = [
            (failed, "failed", self.styles.fail),
            (totals.warned, "warned", self.styles.warn),
            (totals.skipped, "skipped", self.styles.skip),
            (totals.passed(), "passed", self.styles.pass),
        ];

        write!(out, "\n  {}  ", "Tests:".style(self.styles.heading))?;
        let mut first = true;
        for (count, label, style) in parts {
            if count == 0 {
                continue;
            }
            if !first {
                write!(out, ", ")?;
            }
            first = false;
            write!(out, "{}", format!("{count} {label}").style(style))?;
        }
        if first {
            write!(out, "{} {}", 0.style(self.styles.count), tests_str(0))?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "  {}   {}\n",
            "Time:".style(self.styles.heading),
            DisplaySeconds(elapsed)
        )
    }

    /// Writes the start of the coverage report announcement.
    pub fn write_coverage_started(&self, out: &mut dyn WriteStr) -> io::Result<()> {
        write!(out, "Generating code coverage report ... ")?;
        out.write_str_flush()
    }

    /// Finishes the coverage report announcement.
    pub fn write_coverage_done(&self, elapsed: Duration, out: &mut dyn WriteStr) -> io::Result<()> {
        writeln!(
            out,
            "{} [{}]",
            "done".style(self.styles.pass),
            DisplaySeconds(elapsed)
        )
    }
}

#[derive(Clone, Debug, Default)]
struct Styles {
    is_colorized: bool,
    heading: Style,
    count: Style,
    pass: Style,
    fail: Style,
    warn: Style,
    skip: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.is_colorized = true;
        self.heading = Style::new().bold();
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.warn = Style::new().yellow().bold();
        self.skip = Style::new().yellow();
    }
}
