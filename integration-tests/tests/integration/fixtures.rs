// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use integration_tests::{
    partest_cli::{PartestCli, PartestOutput},
    workspace::TempWorkspace,
};

pub(crate) fn fake_engine() -> &'static Utf8Path {
    Utf8Path::new(env!("CARGO_BIN_EXE_fake-engine"))
}

pub(crate) fn workspace() -> TempWorkspace {
    TempWorkspace::new(fake_engine()).expect("workspace created")
}

pub(crate) fn workspace_with_config(run_config: &str) -> TempWorkspace {
    TempWorkspace::with_config(fake_engine(), run_config).expect("workspace created")
}

/// Returns a partest invocation rooted at `ws`.
pub(crate) fn partest(ws: &TempWorkspace) -> PartestCli {
    let mut cli = PartestCli::new(env!("CARGO_BIN_EXE_partest-dup"));
    cli.args(["--workspace-root", ws.root().as_str()]);
    cli
}

/// Returns the run's recap line, without surrounding whitespace.
pub(crate) fn recap_line(output: &PartestOutput) -> String {
    let stdout = output.stdout_as_str();
    let mut recaps = stdout.lines().filter(|line| line.trim_start().starts_with("Tests:"));
    let recap = recaps
        .next()
        .unwrap_or_else(|| panic!("no recap in output:\n\n{output}"));
    assert_eq!(recaps.next(), None, "more than one recap:\n\n{output}");
    recap.trim().to_owned()
}

/// A mixed set of units: 9 cases in total.
pub(crate) fn add_mixed_units(ws: &TempWorkspace) {
    ws.add_unit("a_math", "pass adds\nfail subtracts\npass multiplies\n")
        .expect("unit written");
    ws.add_unit("b_strings", "pass concat\nskip unicode\n")
        .expect("unit written");
    ws.add_unit("c_io", "error reads\nwarn writes\n")
        .expect("unit written");
    ws.add_unit("d_nested/e_deep", "pass deep\nfail deeper\n")
        .expect("unit written");
}
