// Copyright (c) The partest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::WriteReportError, write_str::WriteStr};
use camino::{Utf8Path, Utf8PathBuf};
use partest_metadata::CoverageData;
use quick_xml::escape::escape;
use std::{collections::BTreeMap, fmt};
use swrite::{SWrite, swrite, swriteln};

/// Where the text coverage report goes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TextTarget {
    /// Standard output.
    Stdout,

    /// A file.
    File(Utf8PathBuf),
}

/// The coverage reports requested for a run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CoverageReports {
    /// A plain-text summary.
    pub text: Option<TextTarget>,

    /// A Clover XML report.
    pub clover: Option<Utf8PathBuf>,

    /// A Cobertura XML report.
    pub xml: Option<Utf8PathBuf>,

    /// A directory to write an HTML report into.
    pub html: Option<Utf8PathBuf>,

    /// The merged raw coverage data, in the same JSON format engines write.
    pub raw: Option<Utf8PathBuf>,
}

impl CoverageReports {
    /// Returns true if any report was requested.
    pub fn is_requested(&self) -> bool {
        self.text.is_some()
            || self.clover.is_some()
            || self.xml.is_some()
            || self.html.is_some()
            || self.raw.is_some()
    }

    /// Writes every requested report.
    ///
    /// `timestamp` is a Unix timestamp recorded in the XML reports.
    pub fn write(
        &self,
        data: &CoverageData,
        timestamp: i64,
        stdout: &mut dyn WriteStr,
    ) -> Result<(), WriteReportError> {
        let summary = Summary::new(data);

        if let Some(path) = &self.clover {
            write_file("Clover", path, &clover(&summary, timestamp))?;
        }
        if let Some(path) = &self.xml {
            write_file("Cobertura", path, &cobertura(&summary, timestamp))?;
        }
        if let Some(dir) = &self.html {
            std::fs::create_dir_all(dir)
                .map_err(|error| WriteReportError::new("HTML coverage", dir, error))?;
            write_file("HTML coverage", &dir.join("index.html"), &html(&summary))?;
        }
        if let Some(path) = &self.raw {
            let json = data.to_json_string().map_err(|error| {
                WriteReportError::new("raw coverage", path, std::io::Error::from(error))
            })?;
            write_file("raw coverage", path, &json)?;
        }
        match &self.text {
            Some(TextTarget::File(path)) => write_file("text coverage", path, &text(&summary))?,
            Some(TextTarget::Stdout) => stdout
                .write_str(&text(&summary))
                .map_err(|error| WriteReportError::new("text coverage", "<stdout>", error))?,
            None => {}
        }

        Ok(())
    }
}

fn write_file(
    report: &'static str,
    path: &Utf8Path,
    contents: &str,
) -> Result<(), WriteReportError> {
    std::fs::write(path, contents).map_err(|error| WriteReportError::new(report, path, error))
}

/// Line counts for a file or a whole run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct LineCounts {
    covered: usize,
    total: usize,
}

impl LineCounts {
    fn of(lines: &BTreeMap<u32, u64>) -> Self {
        Self {
            covered: lines.values().filter(|&&hits| hits > 0).count(),
            total: lines.len(),
        }
    }

    fn rate(self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.covered as f64 / self.total as f64
        }
    }
}

struct Percent(LineCounts);

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{:.2}%", self.0.rate() * 100.0))
    }
}

struct Summary<'a> {
    files: Vec<(&'a Utf8Path, &'a BTreeMap<u32, u64>, LineCounts)>,
    overall: LineCounts,
}

impl<'a> Summary<'a> {
    fn new(data: &'a CoverageData) -> Self {
        let mut overall = LineCounts::default();
        let files = data
            .files
            .iter()
            .map(|(path, lines)| {
                let counts = LineCounts::of(lines);
                overall.covered += counts.covered;
                overall.total += counts.total;
                (path.as_path(), lines, counts)
            })
            .collect();
        Self { files, overall }
    }
}

fn text(summary: &Summary<'_>) -> String {
    let width = summary
        .files
        .iter()
        .map(|(path, _, _)| path.as_str().len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    swriteln!(out, "\nCode Coverage Report:\n");
    swriteln!(out, " Summary:");
    swriteln!(
        out,
        "  Lines:   {} ({}/{})\n",
        Percent(summary.overall),
        summary.overall.covered,
        summary.overall.total
    );
    for (path, _, counts) in &summary.files {
        swriteln!(
            out,
            "  {:width$}  Lines: {:>7} ({}/{})",
            path.as_str(),
            Percent(*counts),
            counts.covered,
            counts.total,
        );
    }
    out
}

fn clover(summary: &Summary<'_>, timestamp: i64) -> String {
    let mut out = String::new();
    swriteln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    swriteln!(out, r#"<coverage generated="{timestamp}">"#);
    swriteln!(out, r#"  <project timestamp="{timestamp}">"#);
    for (path, lines, counts) in &summary.files {
        swriteln!(out, r#"    <file name="{}">"#, escape(path.as_str()));
        for (line, hits) in *lines {
            swriteln!(out, r#"      <line num="{line}" type="stmt" count="{hits}"/>"#);
        }
        swriteln!(
            out,
            r#"      <metrics statements="{}" coveredstatements="{}"/>"#,
            counts.total,
            counts.covered
        );
        swriteln!(out, "    </file>");
    }
    swriteln!(
        out,
        r#"    <metrics files="{}" statements="{}" coveredstatements="{}"/>"#,
        summary.files.len(),
        summary.overall.total,
        summary.overall.covered
    );
    swriteln!(out, "  </project>");
    swriteln!(out, "</coverage>");
    out
}

fn cobertura(summary: &Summary<'_>, timestamp: i64) -> String {
    let mut out = String::new();
    swriteln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    swriteln!(
        out,
        r#"<!DOCTYPE coverage SYSTEM "http://cobertura.sourceforge.net/xml/coverage-04.dtd">"#
    );
    swriteln!(
        out,
        r#"<coverage line-rate="{:.4}" branch-rate="0" lines-covered="{}" lines-valid="{}" branches-covered="0" branches-valid="0" complexity="0" version="0.4" timestamp="{timestamp}">"#,
        summary.overall.rate(),
        summary.overall.covered,
        summary.overall.total
    );
    swriteln!(out, "  <packages>");
    swriteln!(
        out,
        r#"    <package name="partest" line-rate="{:.4}" branch-rate="0" complexity="0">"#,
        summary.overall.rate()
    );
    swriteln!(out, "      <classes>");
    for (path, lines, counts) in &summary.files {
        let name = escape(path.as_str());
        swriteln!(
            out,
            r#"        <class name="{name}" filename="{name}" line-rate="{:.4}" branch-rate="0" complexity="0">"#,
            counts.rate()
        );
        swriteln!(out, "          <methods/>");
        swriteln!(out, "          <lines>");
        for (line, hits) in *lines {
            swriteln!(out, r#"            <line number="{line}" hits="{hits}"/>"#);
        }
        swriteln!(out, "          </lines>");
        swriteln!(out, "        </class>");
    }
    swriteln!(out, "      </classes>");
    swriteln!(out, "    </package>");
    swriteln!(out, "  </packages>");
    swriteln!(out, "</coverage>");
    out
}

fn html(summary: &Summary<'_>) -> String {
    let mut out = String::new();
    swriteln!(out, "<!DOCTYPE html>");
    swriteln!(out, r#"<html lang="en">"#);
    swriteln!(out, r#"<head><meta charset="utf-8"><title>Code Coverage</title></head>"#);
    swriteln!(out, "<body>");
    swriteln!(
        out,
        "<h1>Code Coverage: {} ({}/{} lines)</h1>",
        Percent(summary.overall),
        summary.overall.covered,
        summary.overall.total
    );
    swriteln!(out, "<table>");
    swriteln!(out, "<tr><th>File</th><th>Lines</th><th>Covered</th></tr>");
    for (path, _, counts) in &summary.files {
        swrite!(out, "<tr><td>{}</td>", escape(path.as_str()));
        swriteln!(
            out,
            "<td>{}/{}</td><td>{}</td></tr>",
            counts.covered,
            counts.total,
            Percent(*counts)
        );
    }
    swriteln!(out, "</table>");
    swriteln!(out, "</body>");
    swriteln!(out, "</html>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn sample() -> CoverageData {
        let mut data = CoverageData::new();
        data.record("src/a.php", 1, 2);
        data.record("src/a.php", 2, 0);
        data.record("src/b&c.php", 7, 1);
        data
    }

    #[test]
    fn text_report() {
        let data = sample();
        let summary = Summary::new(&data);
        assert_eq!(
            text(&summary),
            indoc! {"

                Code Coverage Report:

                 Summary:
                  Lines:   66.67% (2/3)

                  src/a.php    Lines:  50.00% (1/2)
                  src/b&c.php  Lines: 100.00% (1/1)
            "}
        );
    }

    #[test]
    fn xml_reports_escape_paths() {
        let data = sample();
        let summary = Summary::new(&data);

        let clover = clover(&summary, 1_700_000_000);
        assert!(clover.contains(r#"<file name="src/b&amp;c.php">"#), "{clover}");
        assert!(clover.contains(r#"<line num="1" type="stmt" count="2"/>"#));
        assert!(clover.contains(r#"<metrics files="2" statements="3" coveredstatements="2"/>"#));

        let cobertura = cobertura(&summary, 1_700_000_000);
        assert!(cobertura.contains(r#"lines-covered="2" lines-valid="3""#), "{cobertura}");
        assert!(cobertura.contains(r#"<line number="2" hits="0"/>"#));

        let html = html(&summary);
        assert!(html.contains("<td>src/b&amp;c.php</td>"), "{html}");
    }

    #[test]
    fn writes_requested_reports() {
        let dir = camino_tempfile::tempdir().expect("tempdir created");
        let reports = CoverageReports {
            text: Some(TextTarget::Stdout),
            clover: Some(dir.path().join("clover.xml")),
            xml: None,
            html: Some(dir.path().join("html")),
            raw: Some(dir.path().join("coverage.json")),
        };
        assert!(reports.is_requested());
        assert!(!CoverageReports::default().is_requested());

        let mut stdout = String::new();
        reports
            .write(&sample(), 0, &mut stdout)
            .expect("reports written");
        assert!(stdout.contains("Code Coverage Report:"));
        assert!(dir.path().join("clover.xml").is_file());
        assert!(dir.path().join("html/index.html").is_file());

        let raw = std::fs::read_to_string(dir.path().join("coverage.json")).expect("raw read");
        assert_eq!(CoverageData::from_json_str(&raw).expect("raw parses"), sample());
    }
}
