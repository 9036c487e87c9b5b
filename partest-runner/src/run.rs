// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The top-level run: from enumerating units to the final exit code.

use crate::{
    aggregator::{ExitCategory, ResultAggregator, RunTotals},
    config::{RunConfig, RunOrder, StopPolicy, WorkerMode},
    coverage::{CoverageAccumulator, CoverageReports},
    errors::{AggregateError, CrashReason, RunError, WorkerCrashed},
    output::OutputMultiplexer,
    reporter::Reporter,
    scheduler::{FinishedUnit, Scheduler, SchedulerOptions, TeardownSink, UnitStatus},
    time::stopwatch,
    unit::{InventoryStatus, TestUnit, UnitLoader},
    worker::{EngineCommand, Token},
    write_str::WriteStr,
};
use camino::Utf8PathBuf;
use camino_tempfile::Utf8TempDir;
use chrono::Local;
use partest_metadata::PartestExitCode;
use std::time::Duration;
use tracing::{debug, warn};

/// Options controlling a single run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// The number of worker slots.
    pub processes: usize,

    /// When to discard pending units.
    pub stop_policy: StopPolicy,

    /// The order units are handed out in.
    pub order: RunOrder,

    /// How workers are run.
    pub worker_mode: WorkerMode,

    /// The scheduler's coordination tick.
    pub tick: Duration,

    /// Where per-unit artifacts are created. The system temporary directory if unset.
    pub tmp_dir: Option<Utf8PathBuf>,

    /// Where to write the merged JUnit report.
    pub junit: Option<Utf8PathBuf>,

    /// Where to write the merged TeamCity log.
    pub teamcity: Option<Utf8PathBuf>,

    /// The coverage reports to write.
    pub coverage: CoverageReports,

    /// Whether to print the command line of every launch.
    pub very_verbose: bool,
}

impl RunOptions {
    /// Creates options from the `[run]` section of the config, with no reports requested.
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            processes: config.processes.compute(),
            stop_policy: config.stop_on,
            order: config.order,
            worker_mode: config.worker_mode,
            tick: config.tick_interval,
            tmp_dir: config.tmp_dir.clone(),
            junit: None,
            teamcity: None,
            coverage: CoverageReports::default(),
            very_verbose: false,
        }
    }
}

/// What a completed run amounted to.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Whether anything was scheduled.
    pub status: InventoryStatus,

    /// The totals across every unit.
    pub totals: RunTotals,

    /// The seed used to shuffle units, for random orders.
    pub seed: Option<u64>,

    /// The number of units discarded by the stop policy.
    pub discarded: usize,

    /// How long the run took.
    pub elapsed: Duration,
}

impl RunSummary {
    /// The exit code for the run: the most severe category any unit finished with.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            InventoryStatus::Found => self.totals.highest.exit_code(),
            InventoryStatus::Empty | InventoryStatus::AllFiltered { .. } => PartestExitCode::OK,
        }
    }
}

/// Coordinates a whole run.
///
/// Owns the scheduler along with everything teardown feeds: the result aggregator, the
/// coverage accumulator and the output multiplexer.
pub struct RunController<'a> {
    options: RunOptions,
    reporter: Reporter,
    scheduler: Scheduler<'a>,
    aggregator: ResultAggregator,
    coverage: Option<CoverageAccumulator>,
    output: OutputMultiplexer,
}

impl<'a> RunController<'a> {
    /// Creates a controller that launches units through `engine`.
    pub fn new(engine: &'a EngineCommand, options: RunOptions, reporter: Reporter) -> Self {
        let scheduler = Scheduler::new(
            engine,
            SchedulerOptions {
                processes: options.processes,
                tick: options.tick,
                stop_policy: options.stop_policy,
                worker_mode: options.worker_mode,
            },
        );
        let coverage = options
            .coverage
            .is_requested()
            .then(CoverageAccumulator::new);
        Self {
            options,
            reporter,
            scheduler,
            aggregator: ResultAggregator::new(),
            coverage,
            output: OutputMultiplexer::new(),
        }
    }

    /// Runs every unit `loader` produces, writing progress to `stdout` and `stderr`.
    ///
    /// A worker crash or launch failure aborts the run. Deferred output and the recap of what was
    /// collected are still written before the error is returned.
    pub fn execute(
        &mut self,
        loader: &dyn UnitLoader,
        stdout: &mut dyn WriteStr,
        stderr: &mut dyn WriteStr,
    ) -> Result<RunSummary, RunError> {
        let run_stopwatch = stopwatch();

        let inventory = loader.load_units()?;
        if inventory.status != InventoryStatus::Found {
            self.reporter
                .write_nothing_to_run(inventory.status, stdout)
                .map_err(RunError::Output)?;
            return Ok(RunSummary {
                status: inventory.status,
                totals: RunTotals::default(),
                seed: None,
                discarded: 0,
                elapsed: run_stopwatch.snapshot().duration,
            });
        }

        let order = self.options.order.resolve();
        let test_count = inventory.test_count();
        let artifact_dir = self.artifact_dir()?;
        debug!("per-unit artifacts are in `{}`", artifact_dir.path());

        let needs_coverage = self.coverage.is_some();
        let needs_teamcity = self.options.teamcity.is_some();
        let mut units: Vec<TestUnit> = inventory
            .sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| {
                TestUnit::new(
                    index,
                    source,
                    artifact_dir.path(),
                    needs_coverage,
                    needs_teamcity,
                )
            })
            .collect();
        order.apply(&mut units);

        self.reporter
            .write_header(
                units.len(),
                test_count,
                self.scheduler.processes_for(units.len()),
                order.seed(),
                stdout,
            )
            .map_err(RunError::Output)?;

        let mut teardown = Teardown {
            reporter: &self.reporter,
            very_verbose: self.options.very_verbose,
            aggregator: &mut self.aggregator,
            coverage: self.coverage.as_mut(),
            output: &mut self.output,
            stdout: &mut *stdout,
            stderr: &mut *stderr,
        };
        let scheduled = self
            .scheduler
            .run(units, artifact_dir.path(), &mut teardown);
        let snapshot = run_stopwatch.snapshot();

        let schedule = match scheduled {
            Ok(schedule) => schedule,
            Err(error) => {
                // Don't lose what was collected before the crash.
                self.write_recap(snapshot.duration, stdout)?;
                return Err(error);
            }
        };
        self.write_recap(snapshot.duration, stdout)?;

        if let Some(path) = &self.options.junit {
            self.aggregator
                .write_junit(path, snapshot.start_time, snapshot.duration)?;
        }
        if let Some(path) = &self.options.teamcity {
            self.aggregator.write_teamcity(path)?;
        }
        if let Some(coverage) = &self.coverage {
            let report_stopwatch = stopwatch();
            self.reporter
                .write_coverage_started(stdout)
                .map_err(RunError::Output)?;
            let mut text = String::new();
            self.options
                .coverage
                .write(coverage.data(), Local::now().timestamp(), &mut text)?;
            self.reporter
                .write_coverage_done(report_stopwatch.snapshot().duration, stdout)
                .map_err(RunError::Output)?;
            stdout.write_str(&text).map_err(RunError::Output)?;
        }

        let totals = self.aggregator.totals();
        debug!(
            "{} units recorded, {} discarded, highest category {:?}",
            self.aggregator.units_recorded(),
            schedule.discarded,
            totals.highest
        );
        if let Err(error) = artifact_dir.close() {
            warn!("failed to remove per-unit artifacts: {error}");
        }

        Ok(RunSummary {
            status: InventoryStatus::Found,
            totals,
            seed: order.seed(),
            discarded: schedule.discarded,
            elapsed: snapshot.duration,
        })
    }

    fn artifact_dir(&self) -> Result<Utf8TempDir, RunError> {
        let mut builder = camino_tempfile::Builder::new();
        builder.prefix("partest-");
        match &self.options.tmp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(RunError::TempDir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .map_err(RunError::TempDir)
    }

    fn write_recap(&mut self, elapsed: Duration, stdout: &mut dyn WriteStr) -> Result<(), RunError> {
        self.output
            .flush_deferred(stdout)
            .map_err(RunError::Output)?;
        self.reporter
            .write_recap(&self.aggregator.totals(), elapsed, stdout)
            .map_err(RunError::Output)
    }
}

/// The teardown half of a run, borrowed from the controller while the scheduler runs.
struct Teardown<'c> {
    reporter: &'c Reporter,
    very_verbose: bool,
    aggregator: &'c mut ResultAggregator,
    coverage: Option<&'c mut CoverageAccumulator>,
    output: &'c mut OutputMultiplexer,
    stdout: &'c mut dyn WriteStr,
    stderr: &'c mut dyn WriteStr,
}

impl Teardown<'_> {
    fn forward_output(&mut self, stdout: &str, stderr: &str) -> Result<(), RunError> {
        self.output
            .handle(stdout, self.stdout)
            .map_err(RunError::Output)?;
        if !stderr.is_empty() {
            self.stderr.write_str(stderr).map_err(RunError::Output)?;
        }
        self.stdout.write_str_flush().map_err(RunError::Output)
    }
}

impl TeardownSink for Teardown<'_> {
    fn unit_launched(
        &mut self,
        token: Token,
        unit: &TestUnit,
        command_line: &str,
    ) -> Result<(), RunError> {
        debug!("[token {token}] launched `{}`", unit.id());
        if self.very_verbose {
            self.reporter
                .write_launch(command_line, self.stdout)
                .map_err(RunError::Output)?;
        }
        Ok(())
    }

    fn unit_finished(&mut self, finished: FinishedUnit) -> Result<ExitCategory, RunError> {
        let FinishedUnit {
            token,
            unit,
            command_line,
            status,
            stdout,
            stderr,
        } = finished;

        let crashed = |exit_code, stdout, stderr, reason| -> RunError {
            WorkerCrashed {
                token,
                unit: unit.id().to_string(),
                command_line: command_line.clone(),
                exit_code,
                stdout,
                stderr,
                reason,
            }
            .into()
        };

        let exit_code = match status {
            UnitStatus::Exited(exit_code) => {
                if ExitCategory::from_exit_code(exit_code) == ExitCategory::Crash {
                    return Err(crashed(
                        exit_code,
                        stdout,
                        stderr,
                        CrashReason::UnexpectedExit { exit_code },
                    ));
                }
                exit_code
            }
            UnitStatus::WorkerExited(exit_code) => {
                return Err(crashed(
                    exit_code,
                    stdout,
                    stderr,
                    CrashReason::WorkerExited { exit_code },
                ));
            }
            UnitStatus::Reported => None,
        };

        let counts = match self.aggregator.add_result(&unit) {
            Ok(counts) => counts,
            Err(AggregateError::Malformed(error)) => {
                return Err(crashed(
                    exit_code,
                    stdout,
                    stderr,
                    CrashReason::MalformedArtifact(error),
                ));
            }
            Err(error) => return Err(RunError::Aggregate(error)),
        };
        let category = match status {
            UnitStatus::Exited(exit_code) => ExitCategory::from_exit_code(exit_code),
            UnitStatus::Reported | UnitStatus::WorkerExited(_) => counts.category(),
        };

        self.forward_output(&stdout, &stderr)?;

        if let Err(error) = self.aggregator.add_teamcity(&unit) {
            warn!("failed to read TeamCity log for `{}`: {error}", unit.id());
        }
        if let Err(error) = self
            .aggregator
            .add_coverage(&unit, self.coverage.as_deref_mut())
        {
            warn!("{error}");
        }

        self.aggregator.record_category(category);
        debug!(
            "[token {token}] `{}` torn down: {} tests, {category:?}",
            unit.id(),
            counts.tests
        );
        Ok(category)
    }

    fn worker_stopped(
        &mut self,
        token: Token,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    ) -> Result<(), RunError> {
        debug!("[token {token}] worker stopped with exit code {exit_code:?}");
        self.forward_output(&stdout, &stderr)
    }
}
