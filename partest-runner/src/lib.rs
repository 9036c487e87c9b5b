// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [partest](https://crates.io/crates/partest), a coordinator that runs a
//! test suite across a bounded pool of engine processes.
//!
//! The basic flow is:
//!
//! 1. A [`UnitLoader`](unit::UnitLoader) enumerates every test unit up front.
//! 2. The [`RunController`](run::RunController) orders the units and hands them to the
//!    [`Scheduler`](scheduler::Scheduler).
//! 3. The scheduler assigns units to free worker slots, polls them every tick, and tears down
//!    finished workers.
//! 4. Teardown feeds the [`ResultAggregator`](aggregator::ResultAggregator), the
//!    [`CoverageAccumulator`](coverage::CoverageAccumulator) and the
//!    [`OutputMultiplexer`](output::OutputMultiplexer).
//! 5. The controller prints the recap and writes the requested reports.

pub mod aggregator;
pub mod args;
pub mod config;
pub mod coverage;
pub mod errors;
mod helpers;
pub mod output;
pub mod reporter;
pub mod run;
pub mod scheduler;
mod test_command;
mod time;
pub mod unit;
pub mod worker;
pub mod write_str;
