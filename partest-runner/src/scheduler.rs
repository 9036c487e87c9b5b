// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker pool and its scheduling loop.
//!
//! The [`Scheduler`] owns a bounded set of worker slots, each identified by a [`Token`]. Every
//! tick it hands pending units to free slots, drains worker output, and tears down the workers
//! that finished. Teardown itself is delegated to a [`TeardownSink`], which classifies the unit
//! and feeds the results into the run's totals.
//!
//! All of this happens on a single task. Tests run in subprocesses, so there is no shared state
//! to lock.

use crate::{
    aggregator::ExitCategory,
    config::{StopPolicy, WorkerMode},
    errors::RunError,
    unit::TestUnit,
    worker::{EngineCommand, ReuseWorker, SpawnWorker, Token, Worker, WorkerState},
};
use camino::Utf8Path;
use futures::{StreamExt, stream::FuturesUnordered};
use std::{collections::VecDeque, time::Duration};
use tokio::time::Instant;
use tracing::debug;

pub use crate::worker::UnitStatus;

/// A unit whose worker finished, along with everything captured for it.
#[derive(Debug)]
pub struct FinishedUnit {
    /// The slot the unit ran on.
    pub token: Token,

    /// The unit.
    pub unit: TestUnit,

    /// The command line of the process that ran the unit.
    pub command_line: String,

    /// How the unit's execution ended.
    pub status: UnitStatus,

    /// Standard output captured while the unit ran.
    pub stdout: String,

    /// Standard error captured while the unit ran.
    pub stderr: String,
}

/// Receives units as they are launched and torn down.
///
/// Called from the scheduling loop, in between ticks. A token is only reused once
/// [`Self::unit_finished`] has returned for the unit it was running.
pub trait TeardownSink {
    /// Called after a unit has been handed to a worker.
    fn unit_launched(
        &mut self,
        token: Token,
        unit: &TestUnit,
        command_line: &str,
    ) -> Result<(), RunError>;

    /// Tears down a finished unit, returning its exit category.
    ///
    /// Returning an error (typically [`RunError::WorkerCrashed`]) aborts the run.
    fn unit_finished(&mut self, finished: FinishedUnit) -> Result<ExitCategory, RunError>;

    /// Called with the output a long-lived worker produced outside of any unit, once it has
    /// stopped.
    fn worker_stopped(
        &mut self,
        token: Token,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    ) -> Result<(), RunError>;
}

/// Options for a [`Scheduler`].
#[derive(Clone, Debug)]
pub struct SchedulerOptions {
    /// The number of worker slots. Values below 1 are treated as 1.
    pub processes: usize,

    /// How long to wait between checks on running workers.
    pub tick: Duration,

    /// When to discard the pending queue.
    pub stop_policy: StopPolicy,

    /// Whether to spawn a process per unit or feed long-lived workers.
    pub worker_mode: WorkerMode,
}

/// What happened during a call to [`Scheduler::run`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScheduleSummary {
    /// The most severe category any unit finished with.
    pub highest: ExitCategory,

    /// The number of units handed to a worker.
    pub launched: usize,

    /// The number of pending units discarded by the stop policy.
    pub discarded: usize,
}

struct Slot {
    token: Token,
    state: WorkerState,
    worker: Option<Worker>,
}

impl Slot {
    fn new(token: Token) -> Self {
        Self {
            token,
            state: WorkerState::Idle,
            worker: None,
        }
    }
}

/// Runs units across a bounded pool of workers.
pub struct Scheduler<'a> {
    engine: &'a EngineCommand,
    options: SchedulerOptions,
    slots: Vec<Slot>,
}

impl<'a> Scheduler<'a> {
    /// Creates a scheduler. Slots are allocated when [`Self::run`] is called.
    pub fn new(engine: &'a EngineCommand, options: SchedulerOptions) -> Self {
        Self {
            engine,
            options,
            slots: Vec::new(),
        }
    }

    /// Returns the number of slots a run of `unit_count` units uses.
    ///
    /// This is `options.processes`, capped by the number of units and at least 1.
    pub fn processes_for(&self, unit_count: usize) -> usize {
        self.options.processes.min(unit_count).max(1)
    }

    #[cfg(test)]
    fn states(&self) -> impl Iterator<Item = (Token, &WorkerState)> {
        self.slots.iter().map(|slot| (slot.token, &slot.state))
    }

    /// Runs `units` in the given order until every unit has been torn down or discarded.
    ///
    /// Long-lived workers create their marker files in `marker_dir`. Blocks the current thread.
    /// Stops at the first error returned by `sink`; workers still running at that point are
    /// killed.
    pub fn run(
        &mut self,
        units: Vec<TestUnit>,
        marker_dir: &Utf8Path,
        sink: &mut dyn TeardownSink,
    ) -> Result<ScheduleSummary, RunError> {
        self.slots = (1..=self.processes_for(units.len()))
            .map(|token| Slot::new(Token::new(token)))
            .collect();
        debug!("running {} units on {} slots", units.len(), self.slots.len());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(RunError::RuntimeBuild)?;

        let result = runtime.block_on(async {
            let summary = self.run_loop(units, marker_dir, sink).await?;
            self.shutdown_workers(sink).await?;
            Ok(summary)
        });
        // Dropping the workers kills any processes still running.
        for slot in &mut self.slots {
            slot.worker = None;
        }
        result
    }

    async fn run_loop(
        &mut self,
        units: Vec<TestUnit>,
        marker_dir: &Utf8Path,
        sink: &mut dyn TeardownSink,
    ) -> Result<ScheduleSummary, RunError> {
        let mut pending: VecDeque<TestUnit> = units.into();
        // Slot indexes, in the order they became free.
        let mut free: VecDeque<usize> = (0..self.slots.len()).collect();
        let mut summary = ScheduleSummary::default();

        loop {
            while !pending.is_empty() {
                let Some(index) = free.pop_front() else {
                    break;
                };
                let Some(unit) = pending.pop_front() else {
                    break;
                };
                self.launch(index, unit, marker_dir, sink).await?;
                summary.launched += 1;
            }

            if pending.is_empty() && self.slots.iter().all(|slot| !slot.state.is_busy()) {
                break;
            }

            self.drain_tick().await;

            for index in 0..self.slots.len() {
                let Some(category) = self.poll_slot(index, sink).await? else {
                    continue;
                };
                summary.highest = summary.highest.max(category);
                if !pending.is_empty() && self.options.stop_policy.should_stop(summary.highest) {
                    debug!(
                        "stop policy `{}` triggered, discarding {} pending units",
                        self.options.stop_policy,
                        pending.len()
                    );
                    summary.discarded += pending.len();
                    pending.clear();
                }
                free.push_back(index);
            }
        }

        Ok(summary)
    }

    async fn launch(
        &mut self,
        index: usize,
        unit: TestUnit,
        marker_dir: &Utf8Path,
        sink: &mut dyn TeardownSink,
    ) -> Result<(), RunError> {
        let engine = self.engine;
        let worker_mode = self.options.worker_mode;
        let unit_id = unit.id().clone();
        let token = self.slots[index].token;
        self.slots[index].state = WorkerState::Assigned(unit_id.clone());

        let worker = match worker_mode {
            WorkerMode::Spawn => {
                let worker = SpawnWorker::start(token, unit.clone(), engine)?;
                Worker::Spawn(worker)
            }
            WorkerMode::Reuse => {
                let mut worker = self.idle_reuse_worker(index, marker_dir, sink).await?;
                worker.assign(unit.clone(), engine).await?;
                Worker::Reuse(worker)
            }
        };

        let slot = &mut self.slots[index];
        sink.unit_launched(token, &unit, worker.command_line())?;
        slot.worker = Some(worker);
        slot.state = WorkerState::Running(unit_id);
        Ok(())
    }

    /// Returns the slot's long-lived worker, starting a new one if there is none or the previous
    /// one exited.
    async fn idle_reuse_worker(
        &mut self,
        index: usize,
        marker_dir: &Utf8Path,
        sink: &mut dyn TeardownSink,
    ) -> Result<ReuseWorker, RunError> {
        let token = self.slots[index].token;
        if let Some(Worker::Reuse(mut worker)) = self.slots[index].worker.take() {
            let exited = worker
                .has_exited()
                .map_err(|error| RunError::Poll { token, error })?;
            if !exited {
                return Ok(worker);
            }
            debug!("[token {token}] worker exited between units, restarting it");
            let (exit_code, stdout, stderr) = worker.shutdown().await;
            sink.worker_stopped(token, exit_code, stdout, stderr)?;
        }
        Ok(ReuseWorker::start(token, self.engine, marker_dir)?)
    }

    /// Reads worker output until the next tick.
    async fn drain_tick(&mut self) {
        let deadline = Instant::now() + self.options.tick;
        let drains: FuturesUnordered<_> = self
            .slots
            .iter_mut()
            .filter_map(|slot| slot.worker.as_mut())
            .map(|worker| {
                let acc = worker.accumulator_mut();
                async move {
                    while !acc.is_done() {
                        acc.fill_buf().await;
                    }
                }
            })
            .collect();

        // Pipes may close well before the deadline, so always wait out the full tick.
        let _ = tokio::time::timeout_at(deadline, drains.collect::<Vec<()>>()).await;
        tokio::time::sleep_until(deadline).await;
    }

    /// Tears down the slot's unit if it finished, returning its category.
    async fn poll_slot(
        &mut self,
        index: usize,
        sink: &mut dyn TeardownSink,
    ) -> Result<Option<ExitCategory>, RunError> {
        let tick = self.options.tick;
        let slot = &mut self.slots[index];
        if !slot.state.is_busy() {
            return Ok(None);
        }
        let token = slot.token;
        let Some(worker) = slot.worker.as_mut() else {
            return Ok(None);
        };

        let status = worker
            .poll_finished()
            .map_err(|error| RunError::Poll { token, error })?;
        let Some(status) = status else {
            return Ok(None);
        };
        let command_line = worker.command_line().to_owned();
        let Some((unit, stdout, stderr)) = worker.finish(status, tick).await else {
            return Ok(None);
        };

        let keep_worker = matches!(
            (&slot.worker, status),
            (Some(Worker::Reuse(_)), UnitStatus::Reported)
        );
        if !keep_worker {
            slot.worker = None;
        }

        let unit_id = unit.id().clone();
        debug!("[token {token}] `{unit_id}` finished: {status:?}");
        let finished = FinishedUnit {
            token,
            unit,
            command_line,
            status,
            stdout,
            stderr,
        };
        match sink.unit_finished(finished) {
            Ok(category) => {
                let exit_code = match status {
                    UnitStatus::Exited(exit_code) => exit_code,
                    UnitStatus::Reported | UnitStatus::WorkerExited(_) => None,
                };
                slot.state = WorkerState::Completed {
                    unit: unit_id,
                    exit_code,
                };
                Ok(Some(category))
            }
            Err(error) => {
                slot.state = WorkerState::Crashed(unit_id);
                Err(error)
            }
        }
    }

    /// Stops every long-lived worker, forwarding what it printed outside of a unit.
    async fn shutdown_workers(&mut self, sink: &mut dyn TeardownSink) -> Result<(), RunError> {
        for slot in &mut self.slots {
            if let Some(Worker::Reuse(worker)) = slot.worker.take() {
                let (exit_code, stdout, stderr) = worker.shutdown().await;
                debug!("[token {}] worker stopped with {exit_code:?}", slot.token);
                sink.worker_stopped(slot.token, exit_code, stdout, stderr)?;
            }
            slot.state = WorkerState::Idle;
        }
        Ok(())
    }
}
