// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workers: the engine processes that execute units.
//!
//! A worker owns exactly one subprocess lifecycle. In [spawn mode](crate::config::WorkerMode) a
//! fresh [`SpawnWorker`] is started for every unit. In reuse mode each slot keeps one long-lived
//! [`ReuseWorker`] that is fed units over stdin.

mod command;
mod reuse;
mod spawn;

pub use command::EngineCommand;
pub(crate) use reuse::ReuseWorker;
pub(crate) use spawn::SpawnWorker;

use crate::{
    test_command::ChildAccumulator,
    unit::{TestUnit, UnitId},
};
use std::{fmt, io, time::Duration};

/// Identifies a worker slot. Tokens are numbered from 1 to the process count.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Token(usize);

impl Token {
    /// Creates a new token.
    pub fn new(token: usize) -> Self {
        Self(token)
    }

    /// Returns the token's number.
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The lifecycle of a worker slot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum WorkerState {
    /// No unit is assigned.
    #[default]
    Idle,

    /// A unit has been chosen, but the subprocess hasn't started consuming it.
    Assigned(UnitId),

    /// The subprocess is executing the unit.
    Running(UnitId),

    /// The unit finished and was torn down.
    Completed {
        /// The unit.
        unit: UnitId,

        /// The process exit code, if the unit ran in its own process.
        exit_code: Option<i32>,
    },

    /// The unit's worker crashed.
    Crashed(UnitId),
}

impl WorkerState {
    /// Returns true if a unit is outstanding on this slot.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Assigned(_) | Self::Running(_))
    }
}

/// How a unit's execution ended, as observed by the scheduler.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnitStatus {
    /// The unit's own process exited with this code (`None` if killed by a signal).
    Exited(Option<i32>),

    /// A long-lived worker reported the unit as done.
    Reported,

    /// A long-lived worker exited while the unit was outstanding.
    WorkerExited(Option<i32>),
}

/// A worker in either mode, as driven by the scheduler.
pub(crate) enum Worker {
    Spawn(SpawnWorker),
    Reuse(ReuseWorker),
}

impl Worker {
    pub(crate) fn command_line(&self) -> &str {
        match self {
            Self::Spawn(worker) => worker.command_line(),
            Self::Reuse(worker) => worker.command_line(),
        }
    }

    pub(crate) fn accumulator_mut(&mut self) -> &mut ChildAccumulator {
        match self {
            Self::Spawn(worker) => worker.accumulator_mut(),
            Self::Reuse(worker) => worker.accumulator_mut(),
        }
    }

    /// Returns how the outstanding unit ended, or `None` if it is still running.
    pub(crate) fn poll_finished(&mut self) -> io::Result<Option<UnitStatus>> {
        match self {
            Self::Spawn(worker) => {
                if worker.is_running()? {
                    Ok(None)
                } else {
                    Ok(Some(UnitStatus::Exited(worker.exit_code())))
                }
            }
            Self::Reuse(worker) => worker.poll_finished(),
        }
    }

    /// Collects the remaining output of the outstanding unit and releases it.
    ///
    /// Returns the unit with its (stdout, stderr).
    pub(crate) async fn finish(
        &mut self,
        status: UnitStatus,
        tick: Duration,
    ) -> Option<(TestUnit, String, String)> {
        match self {
            Self::Spawn(worker) => Some(worker.stop().await),
            Self::Reuse(worker) => worker.reset(status, tick).await,
        }
    }
}
