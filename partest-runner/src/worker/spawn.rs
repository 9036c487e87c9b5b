// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{EngineCommand, Token};
use crate::{
    errors::LaunchError,
    test_command::{ChildAccumulator, StdinMode},
    unit::TestUnit,
};
use std::io;
use tokio::process::Child;
use tracing::{debug, warn};

/// A process started for exactly one unit.
pub(crate) struct SpawnWorker {
    token: Token,
    unit: TestUnit,
    command_line: String,
    child: Child,
    acc: ChildAccumulator,
    exit_code: Option<Option<i32>>,
}

impl SpawnWorker {
    /// Launches the engine for `unit`.
    pub(crate) fn start(
        token: Token,
        unit: TestUnit,
        engine: &EngineCommand,
    ) -> Result<Self, LaunchError> {
        let command = engine.unit_command(token, &unit);
        let command_line = command.command_line().to_owned();
        let child = command
            .spawn(StdinMode::Null)
            .map_err(|error| LaunchError::Spawn {
                command_line: command_line.clone(),
                error,
            })?;
        debug!("[token {token}] started `{}`: {command_line}", unit.id());

        Ok(Self {
            token,
            unit,
            command_line,
            child: child.child,
            acc: ChildAccumulator::new(child.fds),
            exit_code: None,
        })
    }

    pub(crate) fn command_line(&self) -> &str {
        &self.command_line
    }

    pub(crate) fn accumulator_mut(&mut self) -> &mut ChildAccumulator {
        &mut self.acc
    }

    /// Non-blocking liveness check.
    pub(crate) fn is_running(&mut self) -> io::Result<bool> {
        if self.exit_code.is_none() {
            self.exit_code = self.child.try_wait()?.map(|status| status.code());
        }
        Ok(self.exit_code.is_none())
    }

    /// The exit code, once [`Self::is_running`] has returned false. `None` if the process was
    /// killed by a signal.
    pub(crate) fn exit_code(&self) -> Option<i32> {
        self.exit_code.flatten()
    }

    /// Waits for the process to exit and collects its output to the end.
    pub(crate) async fn stop(&mut self) -> (TestUnit, String, String) {
        self.acc.fill_to_end().await;
        if self.exit_code.is_none() {
            match self.child.wait().await {
                Ok(status) => self.exit_code = Some(status.code()),
                Err(error) => warn!("[token {}] error waiting for process: {error}", self.token),
            }
        }
        for error in self.acc.take_errors() {
            warn!("[token {}] error reading output: {error}", self.token);
        }
        let (stdout, stderr) = self.acc.take_output();
        (self.unit.clone(), stdout, stderr)
    }
}
