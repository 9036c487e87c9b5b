// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merging per-unit results into run totals.
//!
//! The [`ResultAggregator`] consumes each unit's artifacts exactly once, during teardown. Totals
//! are sums, and reports are written in unit order, so the order in which units complete never
//! affects the outcome.

mod junit;

pub use junit::*;

use crate::{
    coverage::CoverageAccumulator,
    errors::{AggregateError, CoverageError, WriteReportError},
    unit::{TestUnit, UnitId},
};
use camino::Utf8Path;
use chrono::{DateTime, Local};
use partest_metadata::{EngineExitCode, PartestExitCode};
use std::{collections::BTreeMap, io, time::Duration};

/// The outcome category of a unit or a run, ordered by severity.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ExitCategory {
    /// Every test passed.
    #[default]
    Success,

    /// At least one assertion failed.
    Failure,

    /// At least one test errored.
    Error,

    /// The engine crashed.
    Crash,
}

impl ExitCategory {
    /// Classifies an engine exit code.
    ///
    /// Only the codes of [`EngineExitCode`] are recognized. Anything else, including
    /// termination by a signal, is a crash.
    pub fn from_exit_code(exit_code: Option<i32>) -> Self {
        match exit_code {
            Some(EngineExitCode::SUCCESS) => Self::Success,
            Some(EngineExitCode::FAILURE) => Self::Failure,
            Some(EngineExitCode::ERROR) => Self::Error,
            _ => Self::Crash,
        }
    }

    /// Returns the partest exit code for a run whose highest category is `self`.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Success => PartestExitCode::OK,
            Self::Failure => PartestExitCode::TEST_FAILURES,
            Self::Error => PartestExitCode::TEST_ERRORS,
            Self::Crash => PartestExitCode::WORKER_CRASHED,
        }
    }
}

/// Counts from a single unit's result log.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UnitCounts {
    /// Total test cases.
    pub tests: usize,

    /// Cases with failed assertions.
    pub failures: usize,

    /// Cases that errored.
    pub errors: usize,

    /// Cases that passed with a warning.
    pub warnings: usize,

    /// Cases that were skipped.
    pub skipped: usize,
}

impl UnitCounts {
    /// The category implied by these counts: errors outrank failures.
    pub fn category(&self) -> ExitCategory {
        if self.errors > 0 {
            ExitCategory::Error
        } else if self.failures > 0 {
            ExitCategory::Failure
        } else {
            ExitCategory::Success
        }
    }
}

/// Run-wide totals, accumulated as units are torn down.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunTotals {
    /// Total test cases.
    pub tests: usize,

    /// Cases with failed assertions.
    pub failed: usize,

    /// Cases that errored.
    pub errored: usize,

    /// Cases that passed with a warning.
    pub warned: usize,

    /// Cases that were skipped.
    pub skipped: usize,

    /// The most severe category observed so far.
    pub highest: ExitCategory,
}

impl RunTotals {
    /// Cases that passed without a warning.
    pub fn passed(&self) -> usize {
        self.tests
            .saturating_sub(self.failed)
            .saturating_sub(self.errored)
            .saturating_sub(self.warned)
            .saturating_sub(self.skipped)
    }

    fn add(&mut self, counts: &UnitCounts) {
        self.tests += counts.tests;
        self.failed += counts.failures;
        self.errored += counts.errors;
        self.warned += counts.warnings;
        self.skipped += counts.skipped;
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RecordedUnit {
    pub(crate) cases: Vec<ParsedCase>,
}

/// Merges per-unit artifacts into run totals and reports.
#[derive(Clone, Debug, Default)]
pub struct ResultAggregator {
    units: BTreeMap<UnitId, RecordedUnit>,
    teamcity: BTreeMap<UnitId, String>,
    totals: RunTotals,
}

impl ResultAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `unit`'s result log and adds it to the totals.
    ///
    /// Fails if the unit was already recorded, or if its log is absent, empty or unparseable.
    pub fn add_result(&mut self, unit: &TestUnit) -> Result<UnitCounts, AggregateError> {
        if self.units.contains_key(unit.id()) {
            return Err(AggregateError::AlreadyRecorded {
                unit: unit.id().to_string(),
            });
        }

        let log = parse_log(&unit.artifacts().log_path)?;
        self.totals.add(&log.counts);
        self.units
            .insert(unit.id().clone(), RecordedUnit { cases: log.cases });
        Ok(log.counts)
    }

    /// Merges `unit`'s coverage artifact into `coverage`.
    ///
    /// Does nothing if coverage wasn't requested.
    pub fn add_coverage(
        &mut self,
        unit: &TestUnit,
        coverage: Option<&mut CoverageAccumulator>,
    ) -> Result<(), CoverageError> {
        match coverage {
            Some(coverage) => coverage.merge_unit(unit),
            None => Ok(()),
        }
    }

    /// Reads `unit`'s TeamCity log, if one was requested.
    pub fn add_teamcity(&mut self, unit: &TestUnit) -> io::Result<()> {
        if let Some(path) = &unit.artifacts().teamcity_path {
            let contents = std::fs::read_to_string(path)?;
            self.teamcity.insert(unit.id().clone(), contents);
        }
        Ok(())
    }

    /// Raises the run's highest category to at least `category`.
    pub fn record_category(&mut self, category: ExitCategory) {
        self.totals.highest = self.totals.highest.max(category);
    }

    /// Returns the totals so far.
    pub fn totals(&self) -> RunTotals {
        self.totals
    }

    /// Returns the number of units recorded.
    pub fn units_recorded(&self) -> usize {
        self.units.len()
    }

    /// Writes every recorded unit to a single JUnit report.
    pub fn write_junit(
        &self,
        path: &Utf8Path,
        start_time: DateTime<Local>,
        elapsed: Duration,
    ) -> Result<(), WriteReportError> {
        junit::write_report(path, &self.units, start_time, elapsed)
    }

    /// Writes the TeamCity logs of every unit, concatenated in unit order.
    pub fn write_teamcity(&self, path: &Utf8Path) -> Result<(), WriteReportError> {
        let contents: String = self.teamcity.values().map(String::as_str).collect();
        std::fs::write(path, contents)
            .map_err(|error| WriteReportError::new("TeamCity", path, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::UnitSource;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(Some(0), ExitCategory::Success ; "success")]
    #[test_case(Some(1), ExitCategory::Failure ; "failure")]
    #[test_case(Some(2), ExitCategory::Error ; "error")]
    #[test_case(Some(3), ExitCategory::Crash ; "unknown code")]
    #[test_case(Some(255), ExitCategory::Crash ; "high code")]
    #[test_case(None, ExitCategory::Crash ; "signal")]
    fn classify(exit_code: Option<i32>, expected: ExitCategory) {
        assert_eq!(ExitCategory::from_exit_code(exit_code), expected);
    }

    #[test]
    fn category_ordering() {
        assert!(ExitCategory::Success < ExitCategory::Failure);
        assert!(ExitCategory::Failure < ExitCategory::Error);
        assert!(ExitCategory::Error < ExitCategory::Crash);
        assert_eq!(ExitCategory::Crash.exit_code(), PartestExitCode::WORKER_CRASHED);
    }

    fn unit_with_log(dir: &Utf8TempDir, index: usize, log: &str) -> TestUnit {
        let unit = TestUnit::new(
            index,
            UnitSource {
                path: format!("tests/Unit{index}Test.php").into(),
                test_count: 1,
            },
            dir.path(),
            false,
            true,
        );
        std::fs::write(&unit.artifacts().log_path, log).expect("log written");
        let teamcity = unit.artifacts().teamcity_path.as_ref().expect("teamcity requested");
        std::fs::write(teamcity, format!("##teamcity[unit{index}]\n")).expect("log written");
        unit
    }

    #[test]
    fn totals_are_order_insensitive() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let units = [
            unit_with_log(&dir, 0, r#"<testsuite tests="3" failures="1" skipped="1"/>"#),
            unit_with_log(&dir, 1, r#"<testsuite tests="4" errors="2" warnings="1"/>"#),
            unit_with_log(&dir, 2, r#"<testsuite tests="2"/>"#),
        ];

        let mut forward = ResultAggregator::new();
        for unit in &units {
            forward.add_result(unit).expect("result recorded");
            forward.add_teamcity(unit).expect("teamcity recorded");
        }
        let mut backward = ResultAggregator::new();
        for unit in units.iter().rev() {
            backward.add_result(unit).expect("result recorded");
            backward.add_teamcity(unit).expect("teamcity recorded");
        }

        let totals = forward.totals();
        assert_eq!(totals, backward.totals());
        assert_eq!(
            totals,
            RunTotals {
                tests: 9,
                failed: 1,
                errored: 2,
                warned: 1,
                skipped: 1,
                highest: ExitCategory::Success,
            }
        );
        assert_eq!(totals.passed(), 4);

        let forward_path = dir.path().join("forward.log");
        let backward_path = dir.path().join("backward.log");
        forward.write_teamcity(&forward_path).expect("written");
        backward.write_teamcity(&backward_path).expect("written");
        assert_eq!(
            std::fs::read_to_string(&forward_path).expect("read"),
            std::fs::read_to_string(&backward_path).expect("read"),
        );
    }

    #[test]
    fn results_recorded_once() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let unit = unit_with_log(&dir, 0, r#"<testsuite tests="1"/>"#);
        let mut aggregator = ResultAggregator::new();
        aggregator.add_result(&unit).expect("first time succeeds");
        assert!(matches!(
            aggregator.add_result(&unit),
            Err(AggregateError::AlreadyRecorded { .. })
        ));
        assert_eq!(aggregator.units_recorded(), 1);
        assert_eq!(aggregator.totals().tests, 1);
    }

    #[test]
    fn highest_category_only_rises() {
        let mut aggregator = ResultAggregator::new();
        aggregator.record_category(ExitCategory::Error);
        aggregator.record_category(ExitCategory::Failure);
        assert_eq!(aggregator.totals().highest, ExitCategory::Error);
    }

    #[test]
    fn writes_merged_junit() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let unit = unit_with_log(
            &dir,
            0,
            r#"<testsuites><testsuite tests="2" failures="1">
                 <testcase name="works"/>
                 <testcase name="breaks"><failure message="boom"/></testcase>
               </testsuite></testsuites>"#,
        );
        let mut aggregator = ResultAggregator::new();
        aggregator.add_result(&unit).expect("result recorded");

        let path = dir.path().join("junit.xml");
        aggregator
            .write_junit(&path, Local::now(), Duration::from_millis(420))
            .expect("report written");
        let report = std::fs::read_to_string(&path).expect("report read");
        assert!(report.contains(r#"name="tests/Unit0Test.php""#), "{report}");
        assert!(report.contains(r#"name="breaks""#), "{report}");
        assert!(report.contains(r#"<failure message="boom""#), "{report}");

        // The merged report is itself a readable log.
        let reparsed = parse_str(&report).expect("merged report parses");
        assert_eq!(reparsed.counts.tests, 2);
        assert_eq!(reparsed.counts.failures, 1);
    }
}
