// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A duplicate of partest's main.rs, so the integration tests can run the CLI without cargo
//! rebuilding the binary that's currently running them.

use color_eyre::Result;

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = enable_ansi_support::enable_ansi_support();

    partest::main_impl()
}
