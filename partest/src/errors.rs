// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use partest_metadata::PartestExitCode;
use partest_runner::errors::*;
use std::error::Error;
use thiserror::Error;
use tracing::error;

/// The result type used by the partest CLI.
pub type Result<T, E = ExpectedError> = std::result::Result<T, E>;

/// An error that partest knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDirFailed { error: std::io::Error },
    #[error("workspace root is not valid UTF-8")]
    WorkspaceRootInvalidUtf8 { path: std::path::PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("failed to locate the engine")]
    EngineNotFound {
        #[source]
        err: LaunchError,
    },
    #[error("failed to load test units")]
    LoadUnits {
        #[from]
        err: LoadUnitsError,
    },
    #[error("failed to launch an engine process")]
    Launch {
        #[source]
        err: LaunchError,
    },
    #[error("worker crashed")]
    WorkerCrashed { crashed: Box<WorkerCrashed> },
    #[error("failed to write report")]
    WriteReport {
        #[from]
        err: WriteReportError,
    },
    #[error("failed to write output")]
    WriteOutput {
        #[source]
        err: std::io::Error,
    },
    #[error("test run failed")]
    RunFailed {
        #[source]
        err: RunError,
    },
}

impl From<RunError> for ExpectedError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::LoadUnits(err) => Self::LoadUnits { err },
            RunError::Launch(err) => Self::Launch { err },
            RunError::WorkerCrashed(crashed) => Self::WorkerCrashed { crashed },
            RunError::WriteReport(err) => Self::WriteReport { err },
            RunError::Output(err) => Self::WriteOutput { err },
            err => Self::RunFailed { err },
        }
    }
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::WorkspaceRootInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::EngineNotFound { .. }
            | Self::LoadUnits { .. }
            | Self::RunFailed { .. } => PartestExitCode::SETUP_ERROR,
            Self::Launch { .. } | Self::WorkerCrashed { .. } => PartestExitCode::WORKER_CRASHED,
            Self::WriteReport { .. } | Self::WriteOutput { .. } => {
                PartestExitCode::WRITE_OUTPUT_ERROR
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirFailed { error } => {
                error!("could not determine the current directory");
                Some(error as &dyn Error)
            }
            Self::WorkspaceRootInvalidUtf8 { path } => {
                error!(
                    "workspace root `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse partest config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::EngineNotFound { err } | Self::Launch { err } => {
                error!("{err}");
                err.source()
            }
            Self::LoadUnits { err } => {
                error!("failed to load test units");
                Some(err as &dyn Error)
            }
            Self::WorkerCrashed { crashed } => {
                display_crash(crashed, styles);
                crashed.source()
            }
            Self::WriteReport { err } => {
                error!(
                    "failed to write {} report to `{}`",
                    err.report(),
                    err.path().style(styles.bold)
                );
                err.source()
            }
            Self::WriteOutput { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
            Self::RunFailed { err } => {
                error!("{err}");
                err.source()
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

/// Prints a crash report: what crashed, how, and everything it printed.
fn display_crash(crashed: &WorkerCrashed, styles: &StderrStyles) {
    error!(
        "worker {} crashed while running `{}`",
        crashed.token,
        crashed.unit.style(styles.bold)
    );
    error!(
        target: NO_HEADING,
        "{} {}",
        "command:".style(styles.section),
        crashed.command_line
    );
    match crashed.exit_code {
        Some(code) => error!(target: NO_HEADING, "{} {code}", "exit code:".style(styles.section)),
        None => error!(
            target: NO_HEADING,
            "{} none (terminated by a signal)",
            "exit code:".style(styles.section)
        ),
    }
    for (name, output) in [("stdout", &crashed.stdout), ("stderr", &crashed.stderr)] {
        if output.is_empty() {
            continue;
        }
        error!(
            target: NO_HEADING,
            "{}\n{}",
            format!("--- {name} ---").style(styles.section),
            output.trim_end()
        );
    }
}

/// Converts a workspace root to UTF-8.
pub(crate) fn utf8_root(path: std::path::PathBuf) -> Result<Utf8PathBuf> {
    Utf8PathBuf::try_from(path).map_err(|err| ExpectedError::WorkspaceRootInvalidUtf8 {
        path: err.into_path_buf(),
    })
}
