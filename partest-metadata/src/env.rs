// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Set to `1` for every engine process launched by partest.
pub const PARTEST_ENV: &str = "PARTEST";

/// The token (slot number, starting at 1) of the worker running the process.
///
/// No two concurrently running processes share a token, so engines can use it to pick per-slot
/// resources such as database names.
pub const PARTEST_TOKEN_ENV: &str = "PARTEST_TOKEN";

/// A token unique to the unit within the run, in the form `<token>_<unit index>`.
///
/// Only set for processes that run a single unit.
pub const PARTEST_UNIQUE_TOKEN_ENV: &str = "PARTEST_UNIQUE_TOKEN";

/// Set to `1` when the engine should produce colored output even though its stdout is a pipe.
pub const PARTEST_FORCE_COLORS_ENV: &str = "PARTEST_FORCE_COLORS";
