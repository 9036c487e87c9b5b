// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reading per-unit JUnit logs, and writing the merged JUnit report.

use super::{RecordedUnit, UnitCounts};
use crate::{
    errors::{MalformedArtifactError, MalformedArtifactKind, WriteReportError},
    unit::UnitId,
};
use camino::Utf8Path;
use chrono::{DateTime, Local};
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::{collections::BTreeMap, fs::File, io::BufWriter, time::Duration};

/// The contents of one unit's result log.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParsedLog {
    /// Counts taken from the suite attributes.
    pub counts: UnitCounts,

    /// Every test case found, at any nesting depth.
    pub cases: Vec<ParsedCase>,
}

/// A single test case from a result log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedCase {
    /// The case name.
    pub name: String,

    /// The class name, if any.
    pub classname: Option<String>,

    /// The time taken, if recorded.
    pub time: Option<Duration>,

    /// How the case ended.
    pub outcome: CaseOutcome,
}

/// How a test case ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CaseOutcome {
    /// The case passed.
    Passed,

    /// An assertion failed.
    Failure {
        /// The failure message, if any.
        message: Option<String>,
    },

    /// The case errored.
    Error {
        /// The error message, if any.
        message: Option<String>,
    },

    /// The case passed with a warning.
    Warning {
        /// The warning message, if any.
        message: Option<String>,
    },

    /// The case was skipped.
    Skipped {
        /// The reason, if any.
        message: Option<String>,
    },
}

impl CaseOutcome {
    fn message_mut(&mut self) -> Option<&mut Option<String>> {
        match self {
            Self::Passed => None,
            Self::Failure { message }
            | Self::Error { message }
            | Self::Warning { message }
            | Self::Skipped { message } => Some(message),
        }
    }
}

/// Reads and parses the result log at `path`.
pub fn parse_log(path: &Utf8Path) -> Result<ParsedLog, MalformedArtifactError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|error| MalformedArtifactError::new(path, MalformedArtifactKind::Read(error)))?;
    parse_str(&contents).map_err(|kind| MalformedArtifactError::new(path, kind))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Root {
    TestSuites,
    TestSuite,
}

#[derive(Default)]
struct LogParser {
    root: Option<Root>,
    depth: usize,
    log: ParsedLog,
    current_case: Option<ParsedCase>,
    in_outcome: bool,
}

/// Parses the contents of a result log.
pub fn parse_str(contents: &str) -> Result<ParsedLog, MalformedArtifactKind> {
    let mut reader = Reader::from_str(contents);
    reader.config_mut().trim_text(true);

    let mut parser = LogParser::default();
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                parser.open(&e)?;
                parser.depth += 1;
            }
            Event::Empty(e) => {
                parser.open(&e)?;
                parser.close(e.name().as_ref());
            }
            Event::End(e) => {
                parser.depth = parser.depth.saturating_sub(1);
                parser.close(e.name().as_ref());
            }
            Event::Text(text) => {
                if parser.in_outcome {
                    let text = text.unescape()?;
                    parser.set_message_if_empty(&text);
                }
            }
            Event::CData(data) => {
                if parser.in_outcome {
                    let text = String::from_utf8_lossy(&data);
                    parser.set_message_if_empty(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if parser.root.is_none() {
        return Err(MalformedArtifactKind::Empty);
    }
    Ok(parser.log)
}

impl LogParser {
    fn open(&mut self, e: &BytesStart<'_>) -> Result<(), MalformedArtifactKind> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        if self.depth == 0 {
            match name.as_str() {
                "testsuites" => self.root = Some(Root::TestSuites),
                "testsuite" => {
                    self.root = Some(Root::TestSuite);
                    self.add_counts(e)?;
                }
                _ => return Err(MalformedArtifactKind::UnexpectedRoot { name }),
            }
            return Ok(());
        }

        match name.as_str() {
            // Only top-level suites are counted: nested suites repeat their children's counts.
            "testsuite" if self.depth == 1 && self.root == Some(Root::TestSuites) => {
                self.add_counts(e)?;
            }
            "testcase" => {
                let mut case = ParsedCase {
                    name: String::new(),
                    classname: None,
                    time: None,
                    outcome: CaseOutcome::Passed,
                };
                for attr in e.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?;
                    match attr.key.as_ref() {
                        b"name" => case.name = value.into_owned(),
                        b"classname" | b"class" => case.classname = Some(value.into_owned()),
                        b"time" => case.time = Some(parse_time(&name, &value)?),
                        _ => {}
                    }
                }
                self.current_case = Some(case);
            }
            "failure" | "error" | "warning" | "skipped" => {
                if let Some(case) = &mut self.current_case {
                    let mut message = None;
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"message" {
                            message = Some(attr.unescape_value()?.into_owned());
                        }
                    }
                    let outcome = match name.as_str() {
                        "failure" => CaseOutcome::Failure { message },
                        "error" => CaseOutcome::Error { message },
                        "warning" => CaseOutcome::Warning { message },
                        _ => CaseOutcome::Skipped { message },
                    };
                    // A failure or error outranks a warning recorded on the same case.
                    if matches!(case.outcome, CaseOutcome::Passed | CaseOutcome::Warning { .. }) {
                        case.outcome = outcome;
                    }
                    self.in_outcome = true;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"testcase" => {
                if let Some(case) = self.current_case.take() {
                    self.log.cases.push(case);
                }
            }
            b"failure" | b"error" | b"warning" | b"skipped" => self.in_outcome = false,
            _ => {}
        }
    }

    fn set_message_if_empty(&mut self, text: &str) {
        let Some(case) = &mut self.current_case else {
            return;
        };
        if let Some(message @ None) = case.outcome.message_mut() {
            let text = text.trim();
            if !text.is_empty() {
                *message = Some(text.to_owned());
            }
        }
    }

    fn add_counts(&mut self, e: &BytesStart<'_>) -> Result<(), MalformedArtifactKind> {
        let counts = &mut self.log.counts;
        for attr in e.attributes() {
            let attr = attr?;
            let field = match attr.key.as_ref() {
                b"tests" => &mut counts.tests,
                b"failures" => &mut counts.failures,
                b"errors" => &mut counts.errors,
                b"warnings" => &mut counts.warnings,
                b"skipped" => &mut counts.skipped,
                _ => continue,
            };
            let value = attr.unescape_value()?;
            let parsed: usize =
                value
                    .trim()
                    .parse()
                    .map_err(|_| MalformedArtifactKind::InvalidAttribute {
                        element: "testsuite".to_owned(),
                        attribute: String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                        value: value.clone().into_owned(),
                    })?;
            *field += parsed;
        }
        Ok(())
    }
}

fn parse_time(element: &str, value: &str) -> Result<Duration, MalformedArtifactKind> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| MalformedArtifactKind::InvalidAttribute {
            element: element.to_owned(),
            attribute: "time".to_owned(),
            value: value.to_owned(),
        })
}

/// Writes every recorded unit as a test suite, in unit order.
pub(super) fn write_report(
    path: &Utf8Path,
    units: &BTreeMap<UnitId, RecordedUnit>,
    start_time: DateTime<Local>,
    elapsed: Duration,
) -> Result<(), WriteReportError> {
    let mut report = Report::new("partest-run");
    report
        .set_timestamp(start_time.fixed_offset())
        .set_time(elapsed)
        .add_test_suites(units.iter().map(|(id, unit)| make_suite(id, unit)));

    let file = File::create(path).map_err(|error| WriteReportError::new("JUnit", path, error))?;
    report
        .serialize(BufWriter::new(file))
        .map_err(|error| WriteReportError::new("JUnit", path, error))
}

fn make_suite(id: &UnitId, unit: &RecordedUnit) -> TestSuite {
    let mut suite = TestSuite::new(id.as_str());
    for case in &unit.cases {
        let status = match &case.outcome {
            // Warnings don't fail a run, so they're reported as successes.
            CaseOutcome::Passed | CaseOutcome::Warning { .. } => TestCaseStatus::success(),
            CaseOutcome::Failure { message } => {
                with_message(TestCaseStatus::non_success(NonSuccessKind::Failure), message)
            }
            CaseOutcome::Error { message } => {
                with_message(TestCaseStatus::non_success(NonSuccessKind::Error), message)
            }
            CaseOutcome::Skipped { message } => with_message(TestCaseStatus::skipped(), message),
        };

        let mut test_case = TestCase::new(case.name.as_str(), status);
        if let Some(classname) = &case.classname {
            test_case.set_classname(classname.as_str());
        }
        if let Some(time) = case.time {
            test_case.set_time(time);
        }
        suite.add_test_case(test_case);
    }
    suite
}

fn with_message(mut status: TestCaseStatus, message: &Option<String>) -> TestCaseStatus {
    if let Some(message) = message {
        status.set_message(message.as_str());
    }
    status
}
