// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by partest.

use crate::{
    config::{RunOrder, StopPolicy},
    helpers::{DisplayExitCode, join_quoted},
    worker::Token,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::ConfigError;
use std::{io, path::PathBuf};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse partest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// Error returned while parsing a process count.
#[derive(Clone, Debug, Error)]
#[error("invalid process count `{input}`: {message}")]
pub struct ProcessesParseError {
    input: String,
    message: String,
}

impl ProcessesParseError {
    pub(crate) fn new(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            message: message.into(),
        }
    }
}

/// Error returned while parsing a [`RunOrder`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for order: {input}\n(known values: {})",
    RunOrder::variants().join(", "),
)]
pub struct RunOrderParseError {
    input: String,
}

impl RunOrderParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// Error returned while parsing a [`StopPolicy`] value from a string.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for stop-on: {input}\n(known values: {})",
    StopPolicy::variants().join(", "),
)]
pub struct StopPolicyParseError {
    input: String,
}

impl StopPolicyParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurred while enumerating test units.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadUnitsError {
    /// A requested test path does not exist.
    #[error("test path `{path}` does not exist")]
    PathNotFound {
        /// The path that was requested.
        path: Utf8PathBuf,
    },

    /// Walking a directory failed.
    #[error("error walking directory `{path}`")]
    Walk {
        /// The directory being walked.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A discovered path is not valid UTF-8.
    #[error("discovered path `{}` is not valid UTF-8", path.display())]
    NonUtf8Path {
        /// The path that was discovered.
        path: PathBuf,
    },

    /// Reading a candidate file failed.
    #[error("error reading `{path}`")]
    Read {
        /// The file being read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A discovery glob pattern is invalid.
    #[error("invalid discovery pattern `{pattern}`")]
    InvalidPattern {
        /// The pattern.
        pattern: String,

        /// The underlying error.
        #[source]
        error: globset::Error,
    },

    /// A regular expression (the case pattern or a unit filter) is invalid.
    #[error("invalid {what} `{pattern}`")]
    InvalidRegex {
        /// What the regular expression is used for.
        what: &'static str,

        /// The regular expression.
        pattern: String,

        /// The underlying error.
        #[source]
        error: regex::Error,
    },
}

/// An error that occurred while launching an engine process.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LaunchError {
    /// The engine binary could not be located.
    #[error(
        "engine `{engine}` not found (searched {} and PATH)",
        join_quoted(searched)
    )]
    EngineNotFound {
        /// The configured engine.
        engine: String,

        /// The locations that were searched, apart from `PATH`.
        searched: Vec<Utf8PathBuf>,
    },

    /// The engine process could not be spawned.
    #[error("failed to spawn `{command_line}`")]
    Spawn {
        /// The command line that was being spawned.
        command_line: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Creating the marker file for a long-lived worker failed.
    #[error("failed to create worker marker file `{path}`")]
    CreateMarker {
        /// The marker file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Sending a unit to a long-lived worker failed.
    #[error("failed to send unit to worker {token} (`{command_line}`)")]
    SendRequest {
        /// The worker's token.
        token: Token,

        /// The worker's command line.
        command_line: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },
}

/// A per-unit result log was absent, empty or unreadable.
#[derive(Debug, Error)]
#[error("unusable result log at `{path}`")]
pub struct MalformedArtifactError {
    path: Utf8PathBuf,
    #[source]
    kind: MalformedArtifactKind,
}

impl MalformedArtifactError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, kind: MalformedArtifactKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Returns the path to the log.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the kind of problem found.
    pub fn kind(&self) -> &MalformedArtifactKind {
        &self.kind
    }
}

/// The reason a result log is unusable.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MalformedArtifactKind {
    /// The log could not be read (typically because it does not exist).
    #[error("failed to read log")]
    Read(#[source] io::Error),

    /// The log exists but contains no elements.
    #[error("log is empty")]
    Empty,

    /// The log is not well-formed XML.
    #[error("log is not well-formed XML")]
    Xml(#[source] quick_xml::Error),

    /// The root element is neither `<testsuites>` nor `<testsuite>`.
    #[error("unexpected root element `<{name}>`")]
    UnexpectedRoot {
        /// The name of the root element.
        name: String,
    },

    /// A count or time attribute could not be parsed.
    #[error("invalid value `{value}` for attribute `{attribute}` on `<{element}>`")]
    InvalidAttribute {
        /// The element carrying the attribute.
        element: String,

        /// The attribute name.
        attribute: String,

        /// The attribute value.
        value: String,
    },
}

impl From<quick_xml::Error> for MalformedArtifactKind {
    fn from(error: quick_xml::Error) -> Self {
        Self::Xml(error)
    }
}

impl From<quick_xml::events::attributes::AttrError> for MalformedArtifactKind {
    fn from(error: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(error.into())
    }
}

/// An error that occurred while recording a unit's results.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// The unit's result log was unusable.
    #[error(transparent)]
    Malformed(#[from] MalformedArtifactError),

    /// Results for the unit were already recorded.
    #[error("results for unit `{unit}` were already recorded")]
    AlreadyRecorded {
        /// The unit.
        unit: String,
    },
}

/// An error that occurred while reading a per-unit coverage artifact.
///
/// These errors are reported as warnings: a unit without usable coverage does not fail the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoverageError {
    /// The artifact could not be read.
    #[error("failed to read coverage data at `{path}`")]
    Read {
        /// The coverage file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The artifact is not valid coverage data.
    #[error("failed to parse coverage data at `{path}`")]
    Parse {
        /// The coverage file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// Coverage for the unit was already merged.
    #[error("coverage for unit `{unit}` was already merged")]
    AlreadyMerged {
        /// The unit.
        unit: String,
    },
}

/// An error that occurred while writing a report file.
#[derive(Debug, Error)]
#[error("failed to write {report} report to `{path}`")]
pub struct WriteReportError {
    report: &'static str,
    path: Utf8PathBuf,
    #[source]
    kind: WriteReportErrorKind,
}

impl WriteReportError {
    pub(crate) fn new(
        report: &'static str,
        path: impl Into<Utf8PathBuf>,
        kind: impl Into<WriteReportErrorKind>,
    ) -> Self {
        Self {
            report,
            path: path.into(),
            kind: kind.into(),
        }
    }

    /// Returns the name of the report that was being written.
    pub fn report(&self) -> &'static str {
        self.report
    }

    /// Returns the path that was being written.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// The underlying cause of a [`WriteReportError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteReportErrorKind {
    /// An I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// An error producing JUnit XML.
    #[error(transparent)]
    Junit(#[from] quick_junit::SerializeError),
}

/// A worker crashed: its engine exited with a code outside the engine contract, or it produced no
/// usable result log.
///
/// A crash aborts the run.
#[derive(Debug, Error)]
#[error("worker {token} crashed while running `{unit}`")]
pub struct WorkerCrashed {
    /// The token of the worker slot.
    pub token: Token,

    /// The unit that was running.
    pub unit: String,

    /// The command line of the crashed process.
    pub command_line: String,

    /// The exit code of the process, if it exited with one.
    pub exit_code: Option<i32>,

    /// Captured standard output.
    pub stdout: String,

    /// Captured standard error.
    pub stderr: String,

    /// Why this was treated as a crash.
    #[source]
    pub reason: CrashReason,
}

/// The reason a worker was considered crashed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CrashReason {
    /// The engine exited with a code outside the engine contract.
    #[error("the engine exited with {}", DisplayExitCode(*exit_code))]
    UnexpectedExit {
        /// The exit code.
        exit_code: Option<i32>,
    },

    /// A long-lived worker exited while a unit was outstanding.
    #[error("the worker process exited with {} while the unit was outstanding", DisplayExitCode(*exit_code))]
    WorkerExited {
        /// The exit code.
        exit_code: Option<i32>,
    },

    /// The engine produced no usable result log.
    #[error("the engine did not produce a usable result log")]
    MalformedArtifact(#[source] MalformedArtifactError),
}

/// An error that aborted a run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    /// Enumerating test units failed.
    #[error("failed to load test units")]
    LoadUnits(#[from] LoadUnitsError),

    /// An engine process could not be launched.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// A worker crashed.
    #[error(transparent)]
    WorkerCrashed(Box<WorkerCrashed>),

    /// Results for a unit were recorded twice.
    #[error(transparent)]
    Aggregate(AggregateError),

    /// The temporary directory for per-unit artifacts could not be created.
    #[error("failed to create temporary directory for unit artifacts")]
    TempDir(#[source] io::Error),

    /// The async runtime could not be created.
    #[error("failed to build the async runtime")]
    RuntimeBuild(#[source] io::Error),

    /// Checking on a worker process failed.
    #[error("failed to check the status of worker {token}")]
    Poll {
        /// The worker's token.
        token: Token,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// Writing to stdout or stderr failed.
    #[error("error writing output")]
    Output(#[source] io::Error),

    /// Writing a report file failed.
    #[error(transparent)]
    WriteReport(#[from] WriteReportError),
}

impl From<WorkerCrashed> for RunError {
    fn from(crashed: WorkerCrashed) -> Self {
        Self::WorkerCrashed(Box::new(crashed))
    }
}
