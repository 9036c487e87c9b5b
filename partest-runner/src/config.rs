// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for partest.
//!
//! Configuration is layered: the embedded default config, then the repository config at
//! `.config/partest.toml` (or an explicitly passed file). Command-line options are applied on top
//! by the caller.

mod config_impl;
mod policies;
mod processes;
mod run_order;

pub use config_impl::*;
pub use policies::*;
pub use processes::*;
pub use run_order::*;
