// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable contracts for [partest](https://crates.io/crates/partest).
//!
//! Test engines driven by partest link against this crate to produce artifacts partest can
//! consume: raw coverage data, exit codes and the line protocol spoken by long-lived workers.

mod coverage;
mod env;
mod exit_codes;
mod worker;

pub use coverage::*;
pub use env::*;
pub use exit_codes::*;
pub use worker::*;
