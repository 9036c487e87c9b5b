// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{Inventory, UnitLoader, UnitSource};
use crate::{config::DiscoveryConfig, errors::LoadUnitsError};
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;
use walkdir::WalkDir;

/// Finds test units by walking paths on disk.
///
/// A file is a unit if it matches one of the discovery globs (or was named explicitly) and the
/// case pattern matches at least once in its contents. Unit filters, if any, are regular
/// expressions matched against the unit id; a unit is kept if any filter matches.
#[derive(Clone, Debug)]
pub struct PatternLoader {
    workspace_root: Utf8PathBuf,
    paths: Vec<Utf8PathBuf>,
    patterns: GlobSet,
    case_pattern: Regex,
    filters: Vec<Regex>,
}

impl PatternLoader {
    /// Creates a loader from the discovery config.
    ///
    /// `paths`, if non-empty, replaces the configured search paths.
    pub fn new(
        workspace_root: impl Into<Utf8PathBuf>,
        discovery: &DiscoveryConfig,
        paths: Vec<Utf8PathBuf>,
        filters: &[String],
    ) -> Result<Self, LoadUnitsError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &discovery.patterns {
            let glob = Glob::new(pattern).map_err(|error| LoadUnitsError::InvalidPattern {
                pattern: pattern.clone(),
                error,
            })?;
            builder.add(glob);
        }
        let patterns = builder
            .build()
            .map_err(|error| LoadUnitsError::InvalidPattern {
                pattern: discovery.patterns.join(", "),
                error,
            })?;

        let case_pattern = compile_regex("case pattern", &discovery.case_pattern)?;
        let filters = filters
            .iter()
            .map(|filter| compile_regex("unit filter", filter))
            .collect::<Result<Vec<_>, _>>()?;

        let paths = if paths.is_empty() {
            discovery.paths.clone()
        } else {
            paths
        };

        Ok(Self {
            workspace_root: workspace_root.into(),
            paths,
            patterns,
            case_pattern,
            filters,
        })
    }

    fn discover_in(
        &self,
        path: &Utf8Path,
        found: &mut BTreeMap<Utf8PathBuf, usize>,
    ) -> Result<(), LoadUnitsError> {
        let abs_path = self.workspace_root.join(path);
        if abs_path.is_file() {
            // Explicitly named files don't need to match the discovery globs.
            self.consider(path.to_owned(), &abs_path, found)?;
            return Ok(());
        }
        if !abs_path.is_dir() {
            return Err(LoadUnitsError::PathNotFound {
                path: path.to_owned(),
            });
        }

        for entry in WalkDir::new(&abs_path).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|error| LoadUnitsError::Walk {
                path: abs_path.clone(),
                error,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let entry_path = Utf8Path::from_path(entry.path()).ok_or_else(|| {
                LoadUnitsError::NonUtf8Path {
                    path: entry.path().to_owned(),
                }
            })?;
            let rel_path = entry_path
                .strip_prefix(&self.workspace_root)
                .unwrap_or(entry_path);
            if !self.patterns.is_match(rel_path) {
                continue;
            }
            self.consider(rel_path.to_owned(), entry_path, found)?;
        }

        Ok(())
    }

    fn consider(
        &self,
        rel_path: Utf8PathBuf,
        abs_path: &Utf8Path,
        found: &mut BTreeMap<Utf8PathBuf, usize>,
    ) -> Result<(), LoadUnitsError> {
        let contents =
            std::fs::read_to_string(abs_path).map_err(|error| LoadUnitsError::Read {
                path: abs_path.to_owned(),
                error,
            })?;
        let test_count = self.case_pattern.find_iter(&contents).count();
        if test_count == 0 {
            debug!("skipping `{rel_path}`: no test cases found");
            return Ok(());
        }
        found.insert(rel_path, test_count);
        Ok(())
    }

    fn matches_filters(&self, path: &Utf8Path) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| f.is_match(path.as_str()))
    }
}

impl UnitLoader for PatternLoader {
    fn load_units(&self) -> Result<Inventory, LoadUnitsError> {
        let mut found = BTreeMap::new();
        for path in &self.paths {
            self.discover_in(path, &mut found)?;
        }

        let discovered = found.len();
        let sources: Vec<_> = found
            .into_iter()
            .filter(|(path, _)| self.matches_filters(path))
            .map(|(path, test_count)| UnitSource { path, test_count })
            .collect();
        debug!(
            "discovered {discovered} units, {} after filtering",
            sources.len()
        );

        Ok(Inventory::new(discovered, sources))
    }
}

fn compile_regex(what: &'static str, pattern: &str) -> Result<Regex, LoadUnitsError> {
    Regex::new(pattern).map_err(|error| LoadUnitsError::InvalidRegex {
        what,
        pattern: pattern.to_owned(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::PartestConfig, unit::InventoryStatus};
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn discovery() -> DiscoveryConfig {
        DiscoveryConfig {
            paths: vec!["tests".into()],
            patterns: vec!["**/*Test.php".to_owned()],
            case_pattern: PartestConfig::default_config("/").discovery().case_pattern.clone(),
        }
    }

    fn workspace() -> Utf8TempDir {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let tests = dir.path().join("tests");
        std::fs::create_dir_all(tests.join("Unit")).expect("dirs created");
        std::fs::write(
            tests.join("Unit/MathTest.php"),
            indoc! {r#"
                <?php
                it('adds', function () {});
                it('subtracts', function () {});
                test('multiplies', function () {});
            "#},
        )
        .expect("file written");
        std::fs::write(
            tests.join("Unit/EmptyTest.php"),
            "<?php\n// nothing here yet\n",
        )
        .expect("file written");
        std::fs::write(
            tests.join("StringTest.php"),
            "<?php\nit('concatenates', function () {});\n",
        )
        .expect("file written");
        std::fs::write(tests.join("helpers.php"), "<?php\nit('is not a test file');\n")
            .expect("file written");
        dir
    }

    fn paths(inventory: &Inventory) -> Vec<(&str, usize)> {
        inventory
            .sources
            .iter()
            .map(|source| (source.path.as_str(), source.test_count))
            .collect()
    }

    #[test]
    fn discovers_matching_files_with_cases() {
        let dir = workspace();
        let loader =
            PatternLoader::new(dir.path(), &discovery(), vec![], &[]).expect("valid loader");
        let inventory = loader.load_units().expect("units loaded");

        assert_eq!(inventory.status, InventoryStatus::Found);
        assert_eq!(
            paths(&inventory),
            vec![("tests/StringTest.php", 1), ("tests/Unit/MathTest.php", 3)]
        );
        assert_eq!(inventory.test_count(), 4);
    }

    #[test]
    fn explicit_paths_replace_configured_ones() {
        let dir = workspace();
        let loader = PatternLoader::new(
            dir.path(),
            &discovery(),
            vec!["tests/helpers.php".into()],
            &[],
        )
        .expect("valid loader");
        let inventory = loader.load_units().expect("units loaded");
        assert_eq!(paths(&inventory), vec![("tests/helpers.php", 1)]);
    }

    #[test]
    fn filters_narrow_units() {
        let dir = workspace();
        let loader = PatternLoader::new(dir.path(), &discovery(), vec![], &["Math".to_owned()])
            .expect("valid loader");
        let inventory = loader.load_units().expect("units loaded");
        assert_eq!(paths(&inventory), vec![("tests/Unit/MathTest.php", 3)]);

        let loader =
            PatternLoader::new(dir.path(), &discovery(), vec![], &["Nothing".to_owned()])
                .expect("valid loader");
        let inventory = loader.load_units().expect("units loaded");
        assert_eq!(
            inventory.status,
            InventoryStatus::AllFiltered { discovered: 2 }
        );
    }

    #[test]
    fn empty_directory() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        std::fs::create_dir(dir.path().join("tests")).expect("dir created");
        let loader =
            PatternLoader::new(dir.path(), &discovery(), vec![], &[]).expect("valid loader");
        let inventory = loader.load_units().expect("units loaded");
        assert_eq!(inventory.status, InventoryStatus::Empty);
        assert!(inventory.sources.is_empty());
    }

    #[test]
    fn missing_path_is_an_error() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let loader =
            PatternLoader::new(dir.path(), &discovery(), vec!["nope".into()], &[])
                .expect("valid loader");
        let error = loader.load_units().expect_err("path does not exist");
        assert!(
            matches!(&error, LoadUnitsError::PathNotFound { path } if path == "nope"),
            "unexpected error: {error:?}"
        );
    }

    #[test]
    fn invalid_filter_is_an_error() {
        let error = PatternLoader::new("/", &discovery(), vec![], &["(".to_owned()])
            .expect_err("invalid regex");
        assert!(matches!(
            error,
            LoadUnitsError::InvalidRegex {
                what: "unit filter",
                ..
            }
        ));
    }
}
