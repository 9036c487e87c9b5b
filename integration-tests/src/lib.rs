// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers shared by the partest integration tests.

pub mod partest_cli;
pub mod workspace;
