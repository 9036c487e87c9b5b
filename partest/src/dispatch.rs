// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line options and how they are turned into a run.

use crate::{
    ExpectedError, Result,
    errors::utf8_root,
    output::{OutputContext, OutputOpts, OutputWriter},
};
use camino::Utf8PathBuf;
use clap::{Args, Parser, ValueEnum};
use partest_runner::{
    args::ArgPipeline,
    config::{PartestConfig, Processes, RunOrder, StopPolicy, WorkerMode},
    coverage::{CoverageReports, TextTarget},
    reporter::Reporter,
    run::{RunController, RunOptions},
    unit::PatternLoader,
    worker::EngineCommand,
    write_str::WriteStr,
};
use tracing::debug;

/// Parses the command line, runs partest and exits the process.
pub fn main_impl() -> ! {
    let opts = PartestApp::parse();
    let output = opts.init_output();

    match opts.exec(output, &mut OutputWriter::default()) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            error.display_to_stderr(&output.stderr_styles());
            std::process::exit(error.process_exit_code())
        }
    }
}

/// Runs a test suite across a bounded pool of engine processes.
///
/// Test units are discovered up front and handed out to worker slots. Each unit's results,
/// coverage and output are merged into one recap and one set of reports.
#[derive(Debug, Parser)]
#[command(
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100
)]
pub struct PartestApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(flatten)]
    run_opts: RunOpts,

    #[clap(flatten)]
    report_opts: ReportOpts,

    /// Test files or directories to run, relative to the workspace root [default: the configured
    /// discovery paths]
    #[arg(value_name = "PATHS")]
    paths: Vec<Utf8PathBuf>,

    /// Arguments passed through to the engine
    #[arg(last = true, value_name = "ENGINE_ARGS")]
    engine_args: Vec<String>,
}

impl PartestApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app.
    ///
    /// Returns the exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let workspace_root = match self.config_opts.workspace_root {
            Some(root) => root,
            None => utf8_root(
                std::env::current_dir()
                    .map_err(|error| ExpectedError::CurrentDirFailed { error })?,
            )?,
        };
        let config = PartestConfig::from_sources(
            &workspace_root,
            self.config_opts.config_file.as_deref(),
        )?;

        let colorize = output
            .color
            .should_colorize(supports_color::Stream::Stdout);
        let stop_policy = self.run_opts.stop_policy(config.run().stop_on);
        let pipeline = ArgPipeline::standard(colorize, stop_policy);
        let engine = EngineCommand::resolve(
            &workspace_root,
            config.engine(),
            self.run_opts.engine.as_deref(),
            &pipeline,
            &self.engine_args,
            colorize,
        )
        .map_err(|err| ExpectedError::EngineNotFound { err })?;
        debug!("using engine `{}`", engine.program());

        let loader = PatternLoader::new(
            &workspace_root,
            config.discovery(),
            self.paths,
            &self.run_opts.filters,
        )?;

        let mut options = RunOptions::from_config(config.run());
        options.stop_policy = stop_policy;
        options.very_verbose = output.is_very_verbose();
        self.run_opts.apply(&mut options);
        self.report_opts.apply(&mut options);

        let mut controller = RunController::new(&engine, options, Reporter::new(colorize));
        let (mut stdout, mut stderr) = output_writer.writers();
        let result = controller.execute(&loader, &mut stdout, &mut stderr);

        // Flush whatever was written, even if the run failed.
        stdout
            .write_str_flush()
            .and_then(|()| stderr.write_str_flush())
            .map_err(|err| ExpectedError::WriteOutput { err })?;
        let summary = result?;
        Ok(summary.exit_code())
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: <workspace-root>/.config/partest.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// The workspace root [default: the current directory]
    #[arg(long, value_name = "DIR")]
    workspace_root: Option<Utf8PathBuf>,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Runner options")]
struct RunOpts {
    /// Number of engine processes to run at once
    #[arg(
        long,
        short = 'j',
        visible_alias = "jobs",
        value_name = "N",
        allow_negative_numbers = true
    )]
    processes: Option<Processes>,

    /// Stop scheduling units once a unit fails
    #[arg(long)]
    stop_on_failure: bool,

    /// Stop scheduling units once a unit errors
    #[arg(long)]
    stop_on_error: bool,

    /// The order units are handed out in: default, reverse, random or random=SEED
    #[arg(long, value_name = "ORDER")]
    order: Option<RunOrder>,

    /// Only run units whose path matches this regular expression (repeatable)
    #[arg(long = "filter", value_name = "REGEX")]
    filters: Vec<String>,

    /// The engine binary [default: from config]
    #[arg(long, value_name = "PATH")]
    engine: Option<String>,

    /// Start a process per unit (spawn) or keep one worker per slot (reuse)
    #[arg(long, value_enum, value_name = "MODE")]
    worker_mode: Option<WorkerModeOpt>,

    /// Directory in which per-unit artifacts are created
    #[arg(long, value_name = "DIR")]
    tmp_dir: Option<Utf8PathBuf>,
}

impl RunOpts {
    fn stop_policy(&self, configured: StopPolicy) -> StopPolicy {
        if self.stop_on_failure {
            StopPolicy::OnFailure
        } else if self.stop_on_error {
            StopPolicy::OnError
        } else {
            configured
        }
    }

    fn apply(&self, options: &mut RunOptions) {
        if let Some(processes) = self.processes {
            options.processes = processes.compute();
        }
        if let Some(order) = self.order {
            options.order = order;
        }
        if let Some(worker_mode) = self.worker_mode {
            options.worker_mode = worker_mode.into();
        }
        if let Some(tmp_dir) = &self.tmp_dir {
            options.tmp_dir = Some(tmp_dir.clone());
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WorkerModeOpt {
    Spawn,
    Reuse,
}

impl From<WorkerModeOpt> for WorkerMode {
    fn from(opt: WorkerModeOpt) -> Self {
        match opt {
            WorkerModeOpt::Spawn => WorkerMode::Spawn,
            WorkerModeOpt::Reuse => WorkerMode::Reuse,
        }
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Reporting options")]
struct ReportOpts {
    /// Write a merged JUnit report
    #[arg(long, value_name = "PATH")]
    log_junit: Option<Utf8PathBuf>,

    /// Write a merged TeamCity log
    #[arg(long, value_name = "PATH")]
    log_teamcity: Option<Utf8PathBuf>,

    /// Write a text coverage summary to PATH, or to stdout if no path is given
    #[arg(long, value_name = "PATH", num_args = 0..=1, require_equals = true)]
    coverage_text: Option<Option<Utf8PathBuf>>,

    /// Write a Clover XML coverage report
    #[arg(long, value_name = "PATH")]
    coverage_clover: Option<Utf8PathBuf>,

    /// Write a Cobertura XML coverage report
    #[arg(long, value_name = "PATH")]
    coverage_xml: Option<Utf8PathBuf>,

    /// Write an HTML coverage report into DIR
    #[arg(long, value_name = "DIR")]
    coverage_html: Option<Utf8PathBuf>,

    /// Write the merged raw coverage data as JSON
    #[arg(long, value_name = "PATH")]
    coverage_raw: Option<Utf8PathBuf>,
}

impl ReportOpts {
    fn apply(self, options: &mut RunOptions) {
        options.junit = self.log_junit;
        options.teamcity = self.log_teamcity;
        options.coverage = CoverageReports {
            text: self.coverage_text.map(|path| match path {
                Some(path) => TextTarget::File(path),
                None => TextTarget::Stdout,
            }),
            clover: self.coverage_clover,
            xml: self.coverage_xml,
            html: self.coverage_html,
            raw: self.coverage_raw,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> PartestApp {
        PartestApp::try_parse_from(std::iter::once("partest").chain(args.iter().copied()))
            .expect("arguments parse")
    }

    #[test]
    fn parses_paths_and_engine_args() {
        let app = parse(&["-j", "4", "tests/Unit", "--", "--group=slow", "--parallel"]);
        assert_eq!(app.paths, vec![Utf8PathBuf::from("tests/Unit")]);
        assert_eq!(app.engine_args, vec!["--group=slow", "--parallel"]);
        assert_eq!(app.run_opts.processes, Some(Processes::Count(4)));
    }

    #[test]
    fn stop_flags_override_config() {
        let app = parse(&["--stop-on-error"]);
        assert_eq!(app.run_opts.stop_policy(StopPolicy::Never), StopPolicy::OnError);
        let app = parse(&["--stop-on-failure", "--stop-on-error"]);
        assert_eq!(app.run_opts.stop_policy(StopPolicy::Never), StopPolicy::OnFailure);
        let app = parse(&[]);
        assert_eq!(app.run_opts.stop_policy(StopPolicy::OnError), StopPolicy::OnError);
    }

    #[test]
    fn coverage_text_target() {
        let config = PartestConfig::default_config("/ws");
        let report = |args: &[&str]| {
            let mut options = RunOptions::from_config(config.run());
            parse(args).report_opts.apply(&mut options);
            options.coverage.text
        };
        assert_eq!(report(&[]), None);
        assert_eq!(report(&["--coverage-text"]), Some(TextTarget::Stdout));
        assert_eq!(
            report(&["--coverage-text=cov.txt"]),
            Some(TextTarget::File("cov.txt".into()))
        );
    }

    #[test]
    fn run_opts_override_options() {
        let config = PartestConfig::default_config("/ws");
        let mut options = RunOptions::from_config(config.run());
        parse(&[
            "-j",
            "3",
            "--order",
            "random=9",
            "--worker-mode",
            "reuse",
            "--filter",
            "Foo",
            "--filter",
            "Bar",
        ])
        .run_opts
        .apply(&mut options);
        assert_eq!(options.processes, 3);
        assert_eq!(options.order, RunOrder::Random { seed: Some(9) });
        assert_eq!(options.worker_mode, WorkerMode::Reuse);
    }

    #[test]
    fn empty_workspace_runs_nothing() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        std::fs::create_dir_all(dir.path().join("tests")).expect("tests dir created");
        std::fs::write(dir.path().join("engine"), "").expect("engine written");

        let app = parse(&[
            "--workspace-root",
            dir.path().as_str(),
            "--engine",
            "./engine",
            "--color",
            "never",
        ]);
        let output = app.init_output();
        let mut writer = OutputWriter::Test {
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        let code = app.exec(output, &mut writer).expect("empty run succeeds");
        assert_eq!(code, 0);

        let OutputWriter::Test { stdout, .. } = writer else {
            panic!("test writer was replaced");
        };
        let stdout = String::from_utf8(stdout).expect("stdout is UTF-8");
        assert!(stdout.contains("No tests executed!"), "{stdout}");
    }
}
