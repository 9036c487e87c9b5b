// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs a test suite across a bounded pool of engine processes.
//!
//! Test units are discovered up front, handed out to worker slots, and their per-unit results,
//! coverage and output are merged into a single recap and set of reports. The scheduling logic
//! lives in [`partest-runner`](partest_runner); this crate is the command-line front end.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, OutputWriter};
