// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test units and how they are discovered.
//!
//! A test unit is the smallest piece of work handed to a worker: typically one test file. Units
//! are enumerated up front by a [`UnitLoader`], then turned into [`TestUnit`]s carrying the paths
//! of their per-unit artifacts.

mod loader;

pub use loader::*;

use crate::errors::LoadUnitsError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// The identifier of a test unit: its source path as displayed to users.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UnitId(String);

impl UnitId {
    /// Creates a new unit identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit found by a [`UnitLoader`], before any run-specific state is attached to it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnitSource {
    /// The unit's source path, relative to the workspace root where possible.
    pub path: Utf8PathBuf,

    /// The number of test cases in the unit.
    pub test_count: usize,
}

/// Why an inventory contains the units it does.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InventoryStatus {
    /// At least one unit will run.
    Found,

    /// No test units were found at all.
    Empty,

    /// Units were found, but every one of them was filtered out.
    AllFiltered {
        /// The number of units discovered before filtering.
        discovered: usize,
    },
}

/// The complete, ordered list of units to run, produced before scheduling starts.
#[derive(Clone, Debug)]
pub struct Inventory {
    /// The units, in discovery order.
    pub sources: Vec<UnitSource>,

    /// Whether anything was found.
    pub status: InventoryStatus,
}

impl Inventory {
    /// Creates an inventory from the discovered units and the units left after filtering.
    pub fn new(discovered: usize, sources: Vec<UnitSource>) -> Self {
        let status = if !sources.is_empty() {
            InventoryStatus::Found
        } else if discovered == 0 {
            InventoryStatus::Empty
        } else {
            InventoryStatus::AllFiltered { discovered }
        };
        Self { sources, status }
    }

    /// Returns the total number of test cases across all units.
    pub fn test_count(&self) -> usize {
        self.sources.iter().map(|source| source.test_count).sum()
    }
}

/// Produces the list of test units for a run.
///
/// Test discovery is outside partest's core: anything that can enumerate units can drive a run.
pub trait UnitLoader {
    /// Enumerates every unit. Called exactly once, before any unit is scheduled.
    fn load_units(&self) -> Result<Inventory, LoadUnitsError>;
}

/// Paths to the artifacts an engine writes for a unit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UnitArtifacts {
    /// The JUnit result log. Always requested.
    pub log_path: Utf8PathBuf,

    /// The raw coverage file, if coverage was requested.
    pub coverage_path: Option<Utf8PathBuf>,

    /// The TeamCity log, if TeamCity output was requested.
    pub teamcity_path: Option<Utf8PathBuf>,
}

/// A single unit of work, ready to be handed to a worker.
///
/// Immutable once created. Each unit is consumed by exactly one worker.
#[derive(Clone, Debug)]
pub struct TestUnit {
    id: UnitId,
    index: usize,
    path: Utf8PathBuf,
    test_count: usize,
    artifacts: UnitArtifacts,
}

impl TestUnit {
    /// Creates a unit whose artifacts live in `artifact_dir`.
    ///
    /// `index` must be unique within the run. It names the artifact files.
    pub fn new(
        index: usize,
        source: UnitSource,
        artifact_dir: &Utf8Path,
        needs_coverage: bool,
        needs_teamcity: bool,
    ) -> Self {
        let artifacts = UnitArtifacts {
            log_path: artifact_dir.join(format!("unit-{index}.junit.xml")),
            coverage_path: needs_coverage
                .then(|| artifact_dir.join(format!("unit-{index}.coverage.json"))),
            teamcity_path: needs_teamcity
                .then(|| artifact_dir.join(format!("unit-{index}.teamcity.log"))),
        };
        Self {
            id: UnitId::new(source.path.as_str()),
            index,
            path: source.path,
            test_count: source.test_count,
            artifacts,
        }
    }

    /// Returns the unit's identifier.
    pub fn id(&self) -> &UnitId {
        &self.id
    }

    /// Returns the unit's position in the run's discovery order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the unit's source path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the number of test cases in the unit.
    pub fn test_count(&self) -> usize {
        self.test_count
    }

    /// Returns true if the unit's engine must write coverage data.
    pub fn needs_coverage(&self) -> bool {
        self.artifacts.coverage_path.is_some()
    }

    /// Returns true if the unit's engine must write a TeamCity log.
    pub fn needs_teamcity(&self) -> bool {
        self.artifacts.teamcity_path.is_some()
    }

    /// Returns the paths of the unit's artifacts.
    pub fn artifacts(&self) -> &UnitArtifacts {
        &self.artifacts
    }
}
