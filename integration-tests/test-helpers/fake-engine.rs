// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A stand-in test engine used by the integration tests.
//!
//! A unit is a text file with one directive per line:
//!
//! ```text
//! pass <name>         a passing case (also fail, error, skip and warn)
//! crash <code>        exit immediately with <code>, without writing a result log
//! no-log              finish normally but don't write a result log
//! sleep <ms>          sleep before continuing
//! cover <file> <l:h>  record coverage, e.g. `cover src/a.php 1:1,2:0`
//! env <NAME>          print the value of an environment variable in the progress section
//! stderr <text>       print a line to stderr
//! # comment
//! ```
//!
//! Output is laid out like a real engine: progress, then failure details, then a recap.
//!
//! With `--worker --write-to=<marker>` the engine reads run requests from stdin and appends a
//! marker byte after each unit.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{
    Result,
    eyre::{Context, bail, eyre},
};
use partest_metadata::{CoverageData, EngineExitCode, WORKER_MARKER, WorkerRequest};
use std::{
    fmt::Write as _,
    fs::OpenOptions,
    io::{self, BufRead, Write},
    time::Duration,
};

fn main() -> Result<()> {
    color_eyre::install()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--worker") {
        let marker = args
            .iter()
            .find_map(|arg| arg.strip_prefix("--write-to="))
            .ok_or_else(|| eyre!("--worker requires --write-to"))?;
        return run_worker(Utf8Path::new(marker));
    }

    let code = run_unit(&args)?;
    std::process::exit(code);
}

fn run_worker(marker: &Utf8Path) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.wrap_err("failed to read request")?;
        if line.trim().is_empty() {
            continue;
        }
        match WorkerRequest::from_line(&line).wrap_err("invalid request")? {
            WorkerRequest::Run { args } => {
                run_unit(&args)?;
                let mut file = OpenOptions::new()
                    .append(true)
                    .open(marker)
                    .wrap_err_with(|| format!("failed to open marker `{marker}`"))?;
                file.write_all(&[WORKER_MARKER])?;
            }
            WorkerRequest::Exit => break,
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Invocation {
    unit: Utf8PathBuf,
    log: Option<Utf8PathBuf>,
    coverage: Option<Utf8PathBuf>,
    teamcity: Option<Utf8PathBuf>,
}

impl Invocation {
    fn parse(args: &[String]) -> Result<Self> {
        let mut invocation = Self::default();
        let mut unit = None;
        for arg in args {
            if let Some(path) = arg.strip_prefix("--log-junit=") {
                invocation.log = Some(path.into());
            } else if let Some(path) = arg.strip_prefix("--coverage-raw=") {
                invocation.coverage = Some(path.into());
            } else if let Some(path) = arg.strip_prefix("--log-teamcity=") {
                invocation.teamcity = Some(path.into());
            } else if !arg.starts_with("--") {
                unit = Some(Utf8PathBuf::from(arg));
            }
        }
        invocation.unit = unit.ok_or_else(|| eyre!("no unit given in {args:?}"))?;
        Ok(invocation)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Outcome {
    Pass,
    Fail,
    Error,
    Skip,
    Warn,
}

impl Outcome {
    fn symbol(self) -> &'static str {
        match self {
            Outcome::Pass => "✓",
            Outcome::Fail | Outcome::Error => "⨯",
            Outcome::Skip => "-",
            Outcome::Warn => "!",
        }
    }
}

#[derive(Debug)]
struct Case {
    name: String,
    outcome: Outcome,
}

/// Runs one unit and returns the engine exit code.
fn run_unit(args: &[String]) -> Result<i32> {
    let invocation = Invocation::parse(args)?;
    let contents = std::fs::read_to_string(&invocation.unit)
        .wrap_err_with(|| format!("failed to read unit `{}`", invocation.unit))?;

    let mut cases = Vec::new();
    let mut notes = Vec::new();
    let mut coverage = CoverageData::new();
    let mut write_log = true;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (directive, rest) = line.split_once(' ').unwrap_or((line, ""));
        let outcome = match directive {
            "pass" => Outcome::Pass,
            "fail" => Outcome::Fail,
            "error" => Outcome::Error,
            "skip" => Outcome::Skip,
            "warn" => Outcome::Warn,
            "crash" => {
                let code: i32 = rest.parse().wrap_err("invalid crash code")?;
                print!("\n   CRASH  {}\n", invocation.unit);
                io::stdout().flush()?;
                std::process::exit(code);
            }
            "no-log" => {
                write_log = false;
                continue;
            }
            "sleep" => {
                let ms: u64 = rest.parse().wrap_err("invalid sleep duration")?;
                std::thread::sleep(Duration::from_millis(ms));
                continue;
            }
            "cover" => {
                record_coverage(&mut coverage, rest)?;
                continue;
            }
            "env" => {
                let value = std::env::var(rest).unwrap_or_default();
                notes.push(format!("{rest}={value}"));
                continue;
            }
            "stderr" => {
                eprintln!("{rest}");
                continue;
            }
            other => bail!("unknown directive `{other}` in `{}`", invocation.unit),
        };
        cases.push(Case {
            name: rest.to_owned(),
            outcome,
        });
    }

    if write_log {
        if let Some(path) = &invocation.log {
            std::fs::write(path, junit_log(&invocation.unit, &cases))
                .wrap_err_with(|| format!("failed to write log `{path}`"))?;
        }
    }
    if let Some(path) = &invocation.coverage {
        std::fs::write(path, coverage.to_json_string()?)
            .wrap_err_with(|| format!("failed to write coverage `{path}`"))?;
    }
    if let Some(path) = &invocation.teamcity {
        std::fs::write(path, teamcity_log(&invocation.unit, &cases))
            .wrap_err_with(|| format!("failed to write TeamCity log `{path}`"))?;
    }

    let mut stdout = io::stdout().lock();
    stdout.write_all(console_output(&invocation.unit, &cases, &notes).as_bytes())?;
    stdout.flush()?;

    let code = if cases.iter().any(|case| case.outcome == Outcome::Error) {
        EngineExitCode::ERROR
    } else if cases.iter().any(|case| case.outcome == Outcome::Fail) {
        EngineExitCode::FAILURE
    } else {
        EngineExitCode::SUCCESS
    };
    Ok(code)
}

fn record_coverage(coverage: &mut CoverageData, directive: &str) -> Result<()> {
    let (file, lines) = directive
        .split_once(' ')
        .ok_or_else(|| eyre!("cover needs a file and lines: `{directive}`"))?;
    for entry in lines.split(',') {
        let (line, hits) = entry
            .split_once(':')
            .ok_or_else(|| eyre!("invalid coverage entry `{entry}`"))?;
        coverage.record(file, line.parse()?, hits.parse()?);
    }
    Ok(())
}

fn count(cases: &[Case], outcome: Outcome) -> usize {
    cases.iter().filter(|case| case.outcome == outcome).count()
}

fn console_output(unit: &Utf8Path, cases: &[Case], notes: &[String]) -> String {
    if cases.is_empty() {
        return "\n  INFO  No tests executed!\n\n".to_owned();
    }

    let failed = count(cases, Outcome::Fail) + count(cases, Outcome::Error);
    let status = if failed > 0 { "FAIL" } else { "PASS" };

    let mut out = String::new();
    let _ = writeln!(out, "\n   {status}  {unit}");
    for case in cases {
        let _ = writeln!(out, "  {} {}", case.outcome.symbol(), case.name);
    }
    for note in notes {
        let _ = writeln!(out, "  {note}");
    }

    for case in cases {
        let message = match case.outcome {
            Outcome::Fail => "Failed asserting that false is true.",
            Outcome::Error => "Exception: something broke",
            _ => continue,
        };
        let _ = write!(out, "\n  • {unit} > {}\n  {message}\n", case.name);
    }

    let mut parts = Vec::new();
    for (outcome, label) in [
        (failed, "failed"),
        (count(cases, Outcome::Warn), "warned"),
        (count(cases, Outcome::Skip), "skipped"),
        (count(cases, Outcome::Pass), "passed"),
    ] {
        if outcome > 0 {
            parts.push(format!("{outcome} {label}"));
        }
    }
    let _ = write!(out, "\n  Tests:  {}\n  Time:   0.01s\n\n", parts.join(", "));
    out
}

fn junit_log(unit: &Utf8Path, cases: &[Case]) -> String {
    let unit = escape(unit.as_str());
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<testsuites>\n");
    let _ = writeln!(
        out,
        "  <testsuite name=\"{unit}\" tests=\"{}\" failures=\"{}\" errors=\"{}\" \
         warnings=\"{}\" skipped=\"{}\" time=\"0.010\">",
        cases.len(),
        count(cases, Outcome::Fail),
        count(cases, Outcome::Error),
        count(cases, Outcome::Warn),
        count(cases, Outcome::Skip),
    );
    for case in cases {
        let name = escape(&case.name);
        let outcome = match case.outcome {
            Outcome::Pass => None,
            Outcome::Fail => Some("<failure message=\"Failed asserting that false is true.\"/>"),
            Outcome::Error => Some("<error message=\"Exception: something broke\"/>"),
            Outcome::Skip => Some("<skipped/>"),
            Outcome::Warn => Some("<warning message=\"risky test\"/>"),
        };
        match outcome {
            None => {
                let _ = writeln!(
                    out,
                    "    <testcase name=\"{name}\" classname=\"{unit}\" time=\"0.001\"/>"
                );
            }
            Some(element) => {
                let _ = writeln!(
                    out,
                    "    <testcase name=\"{name}\" classname=\"{unit}\" time=\"0.001\">\
                     {element}</testcase>"
                );
            }
        }
    }
    out.push_str("  </testsuite>\n</testsuites>\n");
    out
}

fn teamcity_log(unit: &Utf8Path, cases: &[Case]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "##teamcity[testSuiteStarted name='{unit}']");
    for case in cases {
        let _ = writeln!(out, "##teamcity[testStarted name='{}']", case.name);
        match case.outcome {
            Outcome::Fail | Outcome::Error => {
                let _ = writeln!(out, "##teamcity[testFailed name='{}']", case.name);
            }
            Outcome::Skip => {
                let _ = writeln!(out, "##teamcity[testIgnored name='{}']", case.name);
            }
            Outcome::Pass | Outcome::Warn => {}
        }
        let _ = writeln!(out, "##teamcity[testFinished name='{}']", case.name);
    }
    let _ = writeln!(out, "##teamcity[testSuiteFinished name='{unit}']");
    out
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
