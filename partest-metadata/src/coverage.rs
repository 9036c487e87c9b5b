// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw line coverage, as written by an engine for a single unit and as merged by partest.
///
/// Serialized as JSON:
///
/// ```json
/// { "files": { "src/lib.php": { "3": 1, "4": 0 } } }
/// ```
///
/// Lines mapped to `0` were executable but not hit.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CoverageData {
    /// Per-file line hit counts.
    #[serde(default)]
    pub files: BTreeMap<Utf8PathBuf, BTreeMap<u32, u64>>,
}

impl CoverageData {
    /// Creates empty coverage data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses coverage data from its JSON form.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serializes coverage data to JSON.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Records `hits` executions of `line` in `file`, adding to any existing count.
    pub fn record(&mut self, file: impl Into<Utf8PathBuf>, line: u32, hits: u64) {
        let count = self.files.entry(file.into()).or_default().entry(line).or_insert(0);
        *count = count.saturating_add(hits);
    }

    /// Adds every hit count in `other` into `self`.
    ///
    /// Merging is commutative and associative: the result does not depend on the order in which
    /// per-unit data is merged.
    pub fn merge(&mut self, other: &CoverageData) {
        for (file, lines) in &other.files {
            let target = self.files.entry(file.clone()).or_default();
            for (&line, &hits) in lines {
                let count = target.entry(line).or_insert(0);
                *count = count.saturating_add(hits);
            }
        }
    }

    /// Returns the hit counts for `file`, if any were recorded.
    pub fn lines(&self, file: &Utf8Path) -> Option<&BTreeMap<u32, u64>> {
        self.files.get(file)
    }

    /// Returns true if no file has any recorded lines.
    pub fn is_empty(&self) -> bool {
        self.files.values().all(|lines| lines.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_and_serialize() {
        let json = r#"{"files":{"src/a.php":{"3":2,"10":0}}}"#;
        let data = CoverageData::from_json_str(json).expect("valid coverage JSON");
        assert_eq!(data.lines(Utf8Path::new("src/a.php")).map(|l| l.len()), Some(2));
        assert_eq!(data.files[Utf8Path::new("src/a.php")][&3], 2);
        assert_eq!(data.to_json_string().expect("serializes"), json);
    }

    #[test]
    fn missing_files_key_is_empty() {
        let data = CoverageData::from_json_str("{}").expect("valid coverage JSON");
        assert!(data.is_empty());
    }

    #[test]
    fn merge_adds_hits() {
        let mut a = CoverageData::new();
        a.record("x", 1, 1);
        a.record("x", 2, 0);
        let mut b = CoverageData::new();
        b.record("x", 1, 4);
        b.record("y", 7, u64::MAX);
        b.record("y", 7, 1);

        a.merge(&b);
        assert_eq!(a.files[Utf8Path::new("x")][&1], 5);
        assert_eq!(a.files[Utf8Path::new("x")][&2], 0);
        assert_eq!(a.files[Utf8Path::new("y")][&7], u64::MAX, "hit counts saturate");
    }
}
