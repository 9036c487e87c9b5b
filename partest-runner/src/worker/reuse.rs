// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{EngineCommand, Token, UnitStatus};
use crate::{
    errors::LaunchError,
    test_command::{ChildAccumulator, StdinMode},
    unit::TestUnit,
};
use camino::{Utf8Path, Utf8PathBuf};
use partest_metadata::WorkerRequest;
use std::{io, time::Duration};
use tokio::{
    io::AsyncWriteExt,
    process::{Child, ChildStdin},
    time::Instant,
};
use tracing::{debug, warn};

/// A long-lived engine process that executes units sent to it over stdin.
///
/// The worker appends one marker byte to its marker file for every unit it finishes, so it is
/// free once the marker file is as long as the number of units sent to it.
pub(crate) struct ReuseWorker {
    token: Token,
    command_line: String,
    child: Child,
    stdin: Option<ChildStdin>,
    acc: ChildAccumulator,
    marker_path: Utf8PathBuf,
    units_sent: u64,
    current: Option<TestUnit>,
    exit_code: Option<Option<i32>>,
}

impl ReuseWorker {
    /// Starts a worker process for the slot `token`, with its marker file in `marker_dir`.
    pub(crate) fn start(
        token: Token,
        engine: &EngineCommand,
        marker_dir: &Utf8Path,
    ) -> Result<Self, LaunchError> {
        let marker_path = marker_dir.join(format!("worker-{token}.marker"));
        std::fs::File::create(&marker_path).map_err(|error| LaunchError::CreateMarker {
            path: marker_path.clone(),
            error,
        })?;

        let command = engine.worker_command(token, &marker_path);
        let command_line = command.command_line().to_owned();
        let child = command
            .spawn(StdinMode::Piped)
            .map_err(|error| LaunchError::Spawn {
                command_line: command_line.clone(),
                error,
            })?;
        debug!("[token {token}] started worker: {command_line}");

        Ok(Self {
            token,
            command_line,
            child: child.child,
            stdin: child.stdin,
            acc: ChildAccumulator::new(child.fds),
            marker_path,
            units_sent: 0,
            current: None,
            exit_code: None,
        })
    }

    pub(crate) fn command_line(&self) -> &str {
        &self.command_line
    }

    pub(crate) fn accumulator_mut(&mut self) -> &mut ChildAccumulator {
        &mut self.acc
    }

    /// Returns true if the worker process has exited.
    pub(crate) fn has_exited(&mut self) -> io::Result<bool> {
        if self.exit_code.is_none() {
            self.exit_code = self.child.try_wait()?.map(|status| status.code());
        }
        Ok(self.exit_code.is_some())
    }

    /// Sends `unit` to the worker.
    pub(crate) async fn assign(
        &mut self,
        unit: TestUnit,
        engine: &EngineCommand,
    ) -> Result<(), LaunchError> {
        let request = WorkerRequest::Run {
            args: engine.unit_args(&unit),
        };
        self.send(&request)
            .await
            .map_err(|error| LaunchError::SendRequest {
                token: self.token,
                command_line: self.command_line.clone(),
                error,
            })?;
        self.units_sent += 1;
        debug!("[token {}] sent `{}` to worker", self.token, unit.id());
        self.current = Some(unit);
        Ok(())
    }

    async fn send(&mut self, request: &WorkerRequest) -> io::Result<()> {
        let line = request.to_line()?;
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdin is closed"))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await
    }

    /// Returns true once the worker has finished every unit sent to it.
    pub(crate) fn is_free(&self) -> io::Result<bool> {
        let written = std::fs::metadata(&self.marker_path)?.len();
        Ok(written >= self.units_sent)
    }

    pub(crate) fn poll_finished(&mut self) -> io::Result<Option<UnitStatus>> {
        if self.current.is_none() {
            return Ok(None);
        }
        if self.is_free()? {
            return Ok(Some(UnitStatus::Reported));
        }
        if self.has_exited()? {
            // The worker may have written its marker just before exiting.
            if self.is_free()? {
                return Ok(Some(UnitStatus::Reported));
            }
            return Ok(Some(UnitStatus::WorkerExited(self.exit_code.flatten())));
        }
        Ok(None)
    }

    /// Releases the outstanding unit, returning it along with the output produced for it.
    ///
    /// Output written before the marker is usually still in the pipe, so the pipes are drained
    /// for one more tick. If the worker exited, they are drained to the end instead.
    pub(crate) async fn reset(
        &mut self,
        status: UnitStatus,
        tick: Duration,
    ) -> Option<(TestUnit, String, String)> {
        let unit = self.current.take()?;
        if matches!(status, UnitStatus::WorkerExited(_)) {
            self.acc.fill_to_end().await;
        } else {
            let deadline = Instant::now() + tick;
            while !self.acc.is_done() {
                if tokio::time::timeout_at(deadline, self.acc.fill_buf())
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
        for error in self.acc.take_errors() {
            warn!("[token {}] error reading worker output: {error}", self.token);
        }
        let (stdout, stderr) = self.acc.take_output();
        Some((unit, stdout, stderr))
    }

    /// Asks the worker to exit and waits for it, returning its exit code and residual output.
    pub(crate) async fn shutdown(mut self) -> (Option<i32>, String, String) {
        if self.stdin.is_some() {
            if let Err(error) = self.send(&WorkerRequest::Exit).await {
                debug!("[token {}] failed to send exit request: {error}", self.token);
            }
        }
        // Closing stdin is an exit request too.
        self.stdin = None;
        self.acc.fill_to_end().await;

        let exit_code = match self.exit_code {
            Some(exit_code) => exit_code,
            None => match self.child.wait().await {
                Ok(status) => status.code(),
                Err(error) => {
                    warn!("[token {}] error waiting for worker: {error}", self.token);
                    None
                }
            },
        };
        let (stdout, stderr) = self.acc.take_output();
        (exit_code, stdout, stderr)
    }
}
