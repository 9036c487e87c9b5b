// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! These run partest against temporary workspaces whose units are executed by `fake-engine`, a
//! small engine that reads its test cases from the unit file.
//!
//! partest is invoked through the `partest-dup` binary, which is exactly the same as partest
//! except that it isn't the binary running the tests.

use camino::Utf8Path;
use partest_metadata::{CoverageData, PartestExitCode};
use pretty_assertions::assert_eq;
use regex::Regex;

mod fixtures;

use fixtures::*;

#[test]
fn totals_are_independent_of_process_count() {
    let ws = workspace();
    add_mixed_units(&ws);

    let serial = partest(&ws).args(["-j", "1"]).unchecked(true).output();
    let parallel = partest(&ws).args(["-j", "8"]).unchecked(true).output();

    assert_eq!(serial.exit_code(), PartestExitCode::TEST_ERRORS, "{serial}");
    assert_eq!(parallel.exit_code(), PartestExitCode::TEST_ERRORS, "{parallel}");
    assert_eq!(recap_line(&serial), recap_line(&parallel));
    assert_eq!(
        recap_line(&parallel),
        "Tests:  3 failed, 1 warned, 1 skipped, 4 passed"
    );
    assert!(
        parallel
            .stdout_as_str()
            .contains("Running 4 units (9 tests) using 4 processes"),
        "{parallel}"
    );
}

#[test]
fn passing_run_exits_ok() {
    let ws = workspace();
    ws.add_unit("a", "pass one\npass two\n").expect("unit written");
    ws.add_unit("b", "pass three\n").expect("unit written");

    let output = partest(&ws).output();
    assert_eq!(output.exit_code(), PartestExitCode::OK);
    assert_eq!(recap_line(&output), "Tests:  3 passed");
}

#[test]
fn stop_on_failure_discards_pending_units() {
    let ws = workspace();
    add_mixed_units(&ws);

    let output = partest(&ws)
        .args(["-j", "1", "--stop-on-failure"])
        .unchecked(true)
        .output();
    assert_eq!(output.exit_code(), PartestExitCode::TEST_FAILURES, "{output}");
    assert_eq!(recap_line(&output), "Tests:  1 failed, 2 passed");
    assert!(!output.stdout_as_str().contains("b_strings"), "{output}");
}

#[test]
fn stop_on_error_ignores_failures() {
    let ws = workspace();
    add_mixed_units(&ws);

    let output = partest(&ws)
        .args(["-j", "1", "--stop-on-error"])
        .unchecked(true)
        .output();
    assert_eq!(output.exit_code(), PartestExitCode::TEST_ERRORS, "{output}");
    assert_eq!(
        recap_line(&output),
        "Tests:  2 failed, 1 warned, 1 skipped, 3 passed"
    );
    assert!(!output.stdout_as_str().contains("e_deep"), "{output}");
}

#[test]
fn stop_on_error_boundary() {
    let ws = workspace();
    ws.add_unit("a", "fail one\nfail two\nfail three\n")
        .expect("unit written");
    ws.add_unit("b", "error four\n").expect("unit written");
    ws.add_unit("c", "fail five\n").expect("unit written");

    let output = partest(&ws)
        .args(["-j", "1", "--stop-on-error"])
        .unchecked(true)
        .output();
    assert_eq!(output.exit_code(), PartestExitCode::TEST_ERRORS, "{output}");
    assert_eq!(recap_line(&output), "Tests:  4 failed");
}

#[test]
fn stop_policy_from_config() {
    let ws = workspace_with_config(r#"stop-on = "on-failure""#);
    add_mixed_units(&ws);

    let output = partest(&ws).args(["-j", "1"]).unchecked(true).output();
    assert_eq!(output.exit_code(), PartestExitCode::TEST_FAILURES, "{output}");
    assert_eq!(recap_line(&output), "Tests:  1 failed, 2 passed");
}

#[test]
fn failure_details_are_deferred_until_the_recap() {
    let ws = workspace();
    ws.add_unit("a", "fail first\npass second\n").expect("unit written");
    ws.add_unit("b", "fail third\n").expect("unit written");
    ws.add_unit("c", "pass fourth\n").expect("unit written");

    let output = partest(&ws).args(["-j", "2"]).unchecked(true).output();
    let stdout = output.stdout_as_str();

    let last_progress = stdout.rfind("   PASS  ").expect("progress printed");
    let last_fail_progress = stdout.rfind("   FAIL  ").expect("progress printed");
    let first_details = stdout.find("  • ").expect("details printed");
    let recap = stdout.find("Tests:").expect("recap printed");
    assert!(last_progress < first_details, "{output}");
    assert!(last_fail_progress < first_details, "{output}");
    assert!(first_details < recap, "{output}");
    assert_eq!(stdout.matches("  • ").count(), 2, "{output}");
    assert_eq!(recap_line(&output), "Tests:  2 failed, 2 passed");
}

#[test]
fn crashed_worker_aborts_the_run() {
    let ws = workspace();
    ws.add_unit("a", "pass fine\n").expect("unit written");
    ws.add_unit("b", "pass before\ncrash 9\n").expect("unit written");

    let output = partest(&ws).args(["-j", "1"]).unchecked(true).output();
    assert_eq!(output.exit_code(), PartestExitCode::WORKER_CRASHED, "{output}");

    let stderr = output.stderr_as_str();
    assert!(stderr.contains("crashed while running `tests/b.unit`"), "{output}");
    assert!(stderr.contains("exit code: 9"), "{output}");
    assert!(stderr.contains("CRASH  tests/b.unit"), "{output}");
    // Crash output goes to the crash report, not to the run's stdout.
    assert!(!output.stdout_as_str().contains("CRASH"), "{output}");
}

#[test]
fn crash_does_not_wait_for_other_workers() {
    let ws = workspace();
    ws.add_unit("a_slow", "sleep 5000\npass late\n")
        .expect("unit written");
    ws.add_unit("b_crash", "crash 9\n").expect("unit written");

    let start = std::time::Instant::now();
    let output = partest(&ws).args(["-j", "2"]).unchecked(true).output();
    let elapsed = start.elapsed();

    assert_eq!(output.exit_code(), PartestExitCode::WORKER_CRASHED, "{output}");
    assert!(
        output
            .stderr_as_str()
            .contains("crashed while running `tests/b_crash.unit`"),
        "{output}"
    );
    assert!(
        elapsed < std::time::Duration::from_secs(4),
        "run waited for the sleeping unit ({elapsed:?}):\n\n{output}"
    );
}

#[test]
fn process_count_is_capped_by_unit_count() {
    let ws = workspace();
    ws.add_unit("a", "pass one\n").expect("unit written");

    let output = partest(&ws).args(["-j", "100000000"]).output();
    assert_eq!(output.exit_code(), PartestExitCode::OK, "{output}");
    assert!(
        output
            .stdout_as_str()
            .contains("Running 1 unit (1 test) using 1 process"),
        "{output}"
    );
}

#[test]
fn missing_result_log_is_a_crash() {
    let ws = workspace();
    ws.add_unit("a", "no-log\npass quiet\n").expect("unit written");

    let output = partest(&ws).unchecked(true).output();
    assert_eq!(output.exit_code(), PartestExitCode::WORKER_CRASHED, "{output}");
}

#[test]
fn empty_workspace() {
    let ws = workspace();

    let output = partest(&ws).output();
    assert_eq!(output.exit_code(), PartestExitCode::OK);
    assert!(output.stdout_as_str().contains("No tests executed!"), "{output}");
    assert!(!output.stdout_as_str().contains("Tests:"), "{output}");
}

#[test]
fn everything_filtered_out() {
    let ws = workspace();
    add_mixed_units(&ws);

    let output = partest(&ws).args(["--filter", "nomatch"]).output();
    assert_eq!(output.exit_code(), PartestExitCode::OK);
    assert!(
        output
            .stdout_as_str()
            .contains("No units matched the given filters (4 discovered)"),
        "{output}"
    );
}

#[test]
fn filters_and_paths_select_units() {
    let ws = workspace();
    add_mixed_units(&ws);

    let output = partest(&ws).args(["--filter", "a_math|b_"]).unchecked(true).output();
    assert_eq!(recap_line(&output), "Tests:  1 failed, 1 skipped, 3 passed");

    let output = partest(&ws).arg("tests/d_nested").unchecked(true).output();
    assert_eq!(recap_line(&output), "Tests:  1 failed, 1 passed");
}

#[test]
fn workers_get_distinct_tokens() {
    let ws = workspace();
    let unit = "env PARTEST\nenv PARTEST_TOKEN\nenv PARTEST_UNIQUE_TOKEN\nsleep 20\npass ok\n";
    for name in ["a", "b", "c", "d", "e", "f"] {
        ws.add_unit(name, unit).expect("unit written");
    }

    let output = partest(&ws).args(["-j", "3"]).output();
    let stdout = output.stdout_as_str();
    assert_eq!(stdout.matches("PARTEST=1").count(), 6, "{output}");

    let token_re = Regex::new(r"PARTEST_TOKEN=(\d+)").expect("valid regex");
    for captures in token_re.captures_iter(&stdout) {
        let token: usize = captures[1].parse().expect("token is a number");
        assert!((1..=3).contains(&token), "token {token} out of range:\n\n{output}");
    }

    let unique_re = Regex::new(r"PARTEST_UNIQUE_TOKEN=(\d+)_(\d+)").expect("valid regex");
    let mut unit_indexes: Vec<usize> = unique_re
        .captures_iter(&stdout)
        .map(|captures| captures[2].parse().expect("index is a number"))
        .collect();
    unit_indexes.sort_unstable();
    assert_eq!(unit_indexes, vec![0, 1, 2, 3, 4, 5], "{output}");
}

#[test]
fn reuse_mode_matches_spawn_mode() {
    let ws = workspace();
    add_mixed_units(&ws);

    let spawn = partest(&ws).args(["-j", "2"]).unchecked(true).output();
    let reuse = partest(&ws)
        .args(["-j", "2", "--worker-mode", "reuse"])
        .unchecked(true)
        .output();

    assert_eq!(reuse.exit_code(), spawn.exit_code(), "{reuse}");
    assert_eq!(recap_line(&reuse), recap_line(&spawn));
}

#[test]
fn reuse_mode_crash_aborts_the_run() {
    let ws = workspace();
    ws.add_unit("a", "pass fine\n").expect("unit written");
    ws.add_unit("b", "pass before\ncrash 5\n").expect("unit written");

    let output = partest(&ws)
        .args(["-j", "1", "--worker-mode", "reuse"])
        .unchecked(true)
        .output();
    assert_eq!(output.exit_code(), PartestExitCode::WORKER_CRASHED, "{output}");
}

#[test]
fn random_order_reports_its_seed() {
    let ws = workspace();
    add_mixed_units(&ws);

    let output = partest(&ws)
        .args(["--order", "random=1234"])
        .unchecked(true)
        .output();
    assert!(
        output.stdout_as_str().contains("(random order, seed 1234)"),
        "{output}"
    );
    assert_eq!(
        recap_line(&output),
        "Tests:  3 failed, 1 warned, 1 skipped, 4 passed"
    );
}

#[test]
fn merged_junit_report() {
    let ws = workspace();
    add_mixed_units(&ws);
    let report = ws.path("report.xml");

    partest(&ws)
        .args(["--log-junit", report.as_str()])
        .unchecked(true)
        .output();

    let contents = std::fs::read_to_string(&report).expect("report written");
    for unit in [
        "tests/a_math.unit",
        "tests/b_strings.unit",
        "tests/c_io.unit",
        "tests/d_nested/e_deep.unit",
    ] {
        assert!(
            contents.contains(&format!("<testsuite name=\"{unit}\"")),
            "missing {unit}:\n{contents}"
        );
    }
    assert!(contents.contains("name=\"subtracts\""), "{contents}");
    assert!(contents.contains("<failure"), "{contents}");
    assert!(contents.contains("<error"), "{contents}");
}

#[test]
fn merged_teamcity_log() {
    let ws = workspace();
    ws.add_unit("b", "pass second\n").expect("unit written");
    ws.add_unit("a", "fail first\n").expect("unit written");
    let log = ws.path("teamcity.log");

    partest(&ws)
        .args(["-j", "2", "--log-teamcity", log.as_str()])
        .unchecked(true)
        .output();

    let contents = std::fs::read_to_string(&log).expect("log written");
    let a = contents
        .find("testSuiteStarted name='tests/a.unit'")
        .expect("unit a logged");
    let b = contents
        .find("testSuiteStarted name='tests/b.unit'")
        .expect("unit b logged");
    assert!(a < b, "units out of order:\n{contents}");
    assert!(contents.contains("testFailed name='first'"), "{contents}");
}

#[test]
fn coverage_is_merged_across_units() {
    let ws = workspace();
    ws.add_unit("a", "cover src/lib.php 1:1,2:0,3:0\npass one\n")
        .expect("unit written");
    ws.add_unit("b", "cover src/lib.php 2:3,3:0\ncover src/util.php 7:1\npass two\n")
        .expect("unit written");
    let raw = ws.path("coverage.json");
    let clover = ws.path("clover.xml");

    let output = partest(&ws)
        .args([
            "--coverage-text",
            "--coverage-raw",
            raw.as_str(),
            "--coverage-clover",
            clover.as_str(),
        ])
        .output();

    let stdout = output.stdout_as_str();
    assert!(stdout.contains("Generating code coverage report"), "{output}");
    assert!(stdout.contains("Code Coverage Report:"), "{output}");
    assert!(stdout.contains("Lines:   75.00% (3/4)"), "{output}");
    let recap = stdout.find("Tests:").expect("recap printed");
    let report = stdout.find("Code Coverage Report:").expect("report printed");
    assert!(recap < report, "{output}");

    let raw = std::fs::read_to_string(&raw).expect("raw coverage written");
    let data = CoverageData::from_json_str(&raw).expect("raw coverage parses");
    let lib = data.lines(Utf8Path::new("src/lib.php")).expect("lib.php covered");
    assert_eq!(lib.get(&1), Some(&1));
    assert_eq!(lib.get(&2), Some(&3));
    assert_eq!(lib.get(&3), Some(&0));

    let clover = std::fs::read_to_string(&clover).expect("clover written");
    assert!(clover.contains("<file name=\"src/util.php\">"), "{clover}");
}

#[test]
fn missing_engine_is_a_setup_error() {
    let ws = workspace();
    ws.add_unit("a", "pass one\n").expect("unit written");

    let output = partest(&ws)
        .args(["--engine", "bin/does-not-exist"])
        .unchecked(true)
        .output();
    assert_eq!(output.exit_code(), PartestExitCode::SETUP_ERROR, "{output}");
    assert!(output.stderr_as_str().contains("does-not-exist"), "{output}");
}

#[test]
fn invalid_config_is_a_setup_error() {
    let ws = workspace_with_config("processes = \"lots\"");
    ws.add_unit("a", "pass one\n").expect("unit written");

    let output = partest(&ws).unchecked(true).output();
    assert_eq!(output.exit_code(), PartestExitCode::SETUP_ERROR, "{output}");
    assert!(
        output.stderr_as_str().contains("failed to parse partest config"),
        "{output}"
    );
}

#[test]
fn engine_args_are_passed_through() {
    let ws = workspace();
    ws.add_unit("a", "pass one\n").expect("unit written");

    let output = partest(&ws).args(["-vv", "--", "--group=slow"]).output();
    assert!(output.stdout_as_str().contains("Executing unit via:"), "{output}");
    assert!(output.stdout_as_str().contains("--group=slow"), "{output}");
}
