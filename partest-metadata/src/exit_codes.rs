// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `partest` runs.
///
/// The codes for test outcomes line up with the engine contract, so a suite run through partest
/// exits the same way a single engine invocation would. Codes at and above [`Self::SETUP_ERROR`]
/// are reserved for problems in partest itself.
pub enum PartestExitCode {}

impl PartestExitCode {
    /// No errors occurred and every executed test passed (or no tests were executed).
    pub const OK: i32 = 0;

    /// One or more tests failed an assertion.
    pub const TEST_FAILURES: i32 = 1;

    /// One or more tests errored.
    pub const TEST_ERRORS: i32 = 2;

    /// A worker process crashed, produced no usable result log, or could not be launched.
    pub const WORKER_CRASHED: i32 = 3;

    /// A user issue happened while setting up a partest invocation.
    pub const SETUP_ERROR: i32 = 96;

    /// Writing data to stdout, stderr or a report file produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}

/// Exit codes an engine may use to report the outcome of a unit.
///
/// Any other exit code, or termination by a signal, is treated as a crash.
pub enum EngineExitCode {}

impl EngineExitCode {
    /// All tests in the unit passed.
    pub const SUCCESS: i32 = 0;

    /// At least one test failed an assertion.
    pub const FAILURE: i32 = 1;

    /// At least one test errored.
    pub const ERROR: i32 = 2;
}
