// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Token;
use crate::{
    args::ArgPipeline,
    config::EngineConfig,
    errors::LaunchError,
    test_command::{EngineEnv, TestCommand},
    unit::TestUnit,
};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::env::consts::EXE_SUFFIX;

/// How to invoke the engine, resolved once per run.
#[derive(Clone, Debug)]
pub struct EngineCommand {
    program: Utf8PathBuf,
    cwd: Utf8PathBuf,
    base_args: Vec<String>,
    passthrough: Vec<String>,
    log_junit_flag: String,
    coverage_flag: String,
    teamcity_flag: String,
    worker_flag: String,
    write_to_flag: String,
    env: IndexMap<String, String>,
    force_colors: bool,
}

impl EngineCommand {
    /// Locates the engine and prepares the arguments shared by every launch.
    ///
    /// `binary` overrides the configured engine. The passthrough arguments are rewritten through
    /// `pipeline` once, here.
    pub fn resolve(
        workspace_root: &Utf8Path,
        config: &EngineConfig,
        binary: Option<&str>,
        pipeline: &ArgPipeline,
        passthrough: &[String],
        force_colors: bool,
    ) -> Result<Self, LaunchError> {
        let binary = binary.unwrap_or(&config.binary);
        let program = locate_engine(workspace_root, binary, &config.search_dirs)?;

        Ok(Self {
            program,
            cwd: workspace_root.to_owned(),
            base_args: config.args.clone(),
            passthrough: pipeline.apply(passthrough),
            log_junit_flag: config.log_junit_flag.clone(),
            coverage_flag: config.coverage_flag.clone(),
            teamcity_flag: config.teamcity_flag.clone(),
            worker_flag: config.worker_flag.clone(),
            write_to_flag: config.write_to_flag.clone(),
            env: config.env.clone(),
            force_colors,
        })
    }

    /// Returns the resolved engine executable.
    pub fn program(&self) -> &Utf8Path {
        &self.program
    }

    /// Returns the arguments that run a single unit, excluding the program and the base
    /// arguments.
    ///
    /// These are also what a long-lived worker receives in a run request.
    pub fn unit_args(&self, unit: &TestUnit) -> Vec<String> {
        let artifacts = unit.artifacts();
        let mut args = self.passthrough.clone();
        args.push(format!("{}={}", self.log_junit_flag, artifacts.log_path));
        if let Some(path) = &artifacts.coverage_path {
            args.push(format!("{}={path}", self.coverage_flag));
        }
        if let Some(path) = &artifacts.teamcity_path {
            args.push(format!("{}={path}", self.teamcity_flag));
        }
        args.push(unit.path().to_string());
        args
    }

    pub(crate) fn unit_command(&self, token: Token, unit: &TestUnit) -> TestCommand {
        let mut args = self.base_args.clone();
        args.extend(self.unit_args(unit));
        let env = EngineEnv {
            token: token.get(),
            unique_token: Some(format!("{token}_{}", unit.index())),
            force_colors: self.force_colors,
            extra: &self.env,
        };
        TestCommand::new(&self.program, &args, &self.cwd, &env)
    }

    pub(crate) fn worker_command(&self, token: Token, marker_path: &Utf8Path) -> TestCommand {
        let mut args = self.base_args.clone();
        args.push(self.worker_flag.clone());
        args.push(format!("{}={marker_path}", self.write_to_flag));
        let env = EngineEnv {
            token: token.get(),
            unique_token: None,
            force_colors: self.force_colors,
            extra: &self.env,
        };
        TestCommand::new(&self.program, &args, &self.cwd, &env)
    }
}

/// Finds the engine executable.
///
/// A binary containing a path separator is taken relative to the workspace root. Otherwise the
/// search directories are tried in order, then `PATH`.
fn locate_engine(
    workspace_root: &Utf8Path,
    binary: &str,
    search_dirs: &[Utf8PathBuf],
) -> Result<Utf8PathBuf, LaunchError> {
    if binary.contains('/') || binary.contains(std::path::MAIN_SEPARATOR) {
        let path = workspace_root.join(binary);
        return if path.is_file() {
            Ok(path)
        } else {
            Err(LaunchError::EngineNotFound {
                engine: binary.to_owned(),
                searched: vec![path],
            })
        };
    }

    let mut searched = Vec::with_capacity(search_dirs.len());
    for dir in search_dirs {
        let dir = workspace_root.join(dir);
        if let Some(path) = find_in_dir(&dir, binary) {
            return Ok(path);
        }
        searched.push(dir);
    }

    if let Some(paths) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&paths) {
            let Ok(dir) = Utf8PathBuf::try_from(dir) else {
                continue;
            };
            if let Some(path) = find_in_dir(&dir, binary) {
                return Ok(path);
            }
        }
    }

    Err(LaunchError::EngineNotFound {
        engine: binary.to_owned(),
        searched,
    })
}

fn find_in_dir(dir: &Utf8Path, binary: &str) -> Option<Utf8PathBuf> {
    let candidate = dir.join(binary);
    if candidate.is_file() {
        return Some(candidate);
    }
    if !EXE_SUFFIX.is_empty() {
        let candidate = dir.join(format!("{binary}{EXE_SUFFIX}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
