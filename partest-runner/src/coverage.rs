// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merging per-unit coverage and writing coverage reports.

mod report;

pub use report::*;

use crate::{
    errors::CoverageError,
    unit::{TestUnit, UnitId},
};
use partest_metadata::CoverageData;
use std::collections::BTreeSet;

/// The single merge target for coverage in a run.
///
/// Each unit's artifact is merged at most once.
#[derive(Clone, Debug, Default)]
pub struct CoverageAccumulator {
    data: CoverageData,
    merged: BTreeSet<UnitId>,
}

impl CoverageAccumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `unit`'s raw coverage artifact and merges it.
    ///
    /// Does nothing if the unit wasn't asked for coverage.
    pub fn merge_unit(&mut self, unit: &TestUnit) -> Result<(), CoverageError> {
        let Some(path) = &unit.artifacts().coverage_path else {
            return Ok(());
        };
        if !self.merged.insert(unit.id().clone()) {
            return Err(CoverageError::AlreadyMerged {
                unit: unit.id().to_string(),
            });
        }

        let contents = std::fs::read_to_string(path).map_err(|error| CoverageError::Read {
            path: path.clone(),
            error,
        })?;
        let data = CoverageData::from_json_str(&contents).map_err(|error| CoverageError::Parse {
            path: path.clone(),
            error,
        })?;
        self.data.merge(&data);
        Ok(())
    }

    /// Returns the merged data.
    pub fn data(&self) -> &CoverageData {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::UnitSource;
    use camino::Utf8Path;
    use pretty_assertions::assert_eq;
    use test_strategy::proptest;

    fn coverage_unit(dir: &Utf8Path, index: usize, json: Option<&str>) -> TestUnit {
        let unit = TestUnit::new(
            index,
            UnitSource {
                path: format!("tests/U{index}Test.php").into(),
                test_count: 1,
            },
            dir,
            true,
            false,
        );
        if let Some(json) = json {
            let path = unit.artifacts().coverage_path.as_ref().expect("coverage requested");
            std::fs::write(path, json).expect("coverage written");
        }
        unit
    }

    #[test]
    fn merges_each_unit_once() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let a = coverage_unit(dir.path(), 0, Some(r#"{"files":{"src/a.php":{"1":1,"2":0}}}"#));
        let b = coverage_unit(dir.path(), 1, Some(r#"{"files":{"src/a.php":{"2":3}}}"#));

        let mut acc = CoverageAccumulator::new();
        acc.merge_unit(&a).expect("merged");
        acc.merge_unit(&b).expect("merged");
        assert!(matches!(
            acc.merge_unit(&a),
            Err(CoverageError::AlreadyMerged { .. })
        ));

        let lines = acc.data().lines(Utf8Path::new("src/a.php")).expect("file present");
        assert_eq!(lines.get(&1), Some(&1));
        assert_eq!(lines.get(&2), Some(&3));
    }

    #[test]
    fn missing_and_invalid_artifacts() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let missing = coverage_unit(dir.path(), 0, None);
        let invalid = coverage_unit(dir.path(), 1, Some("not json"));

        let mut acc = CoverageAccumulator::new();
        assert!(matches!(
            acc.merge_unit(&missing),
            Err(CoverageError::Read { .. })
        ));
        assert!(matches!(
            acc.merge_unit(&invalid),
            Err(CoverageError::Parse { .. })
        ));
        assert!(acc.data().is_empty());
    }

    #[test]
    fn units_without_coverage_are_ignored() {
        let unit = TestUnit::new(
            0,
            UnitSource {
                path: "tests/ATest.php".into(),
                test_count: 1,
            },
            Utf8Path::new("/nonexistent"),
            false,
            false,
        );
        let mut acc = CoverageAccumulator::new();
        acc.merge_unit(&unit).expect("no-op");
        acc.merge_unit(&unit).expect("still a no-op");
    }

    #[proptest(cases = 64)]
    fn merge_is_commutative(
        #[strategy(proptest::collection::vec((0u8..4, 1u32..20, 0u64..100), 0..32))]
        a: Vec<(u8, u32, u64)>,
        #[strategy(proptest::collection::vec((0u8..4, 1u32..20, 0u64..100), 0..32))]
        b: Vec<(u8, u32, u64)>,
    ) {
        let build = |entries: &[(u8, u32, u64)]| {
            let mut data = CoverageData::new();
            for &(file, line, hits) in entries {
                data.record(format!("src/f{file}.php"), line, hits);
            }
            data
        };
        let (a, b) = (build(&a), build(&b));

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        proptest::prop_assert_eq!(ab, ba);
    }
}
