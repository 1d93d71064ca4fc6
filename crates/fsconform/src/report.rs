//! Results of a conformance run and their JSON / JUnit renderings.

use crate::error::ConformError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    /// The driver answered as expected.
    Pass,
    /// The driver's answer disagreed with the golden values.
    Fail,
    Skip,
    /// The case could not run to completion (OS call failed, malformed
    /// buffer, ...).
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub suite: String,
    pub status: CaseStatus,
    pub duration: Duration,
    pub message: Option<String>,
}

impl CaseResult {
    pub fn new(name: &str, suite: &str, status: CaseStatus, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            suite: suite.to_string(),
            status,
            duration,
            message: None,
        }
    }

    /// Classifies `err` as a failure or an error and keeps its text.
    pub fn from_error(name: &str, suite: &str, duration: Duration, err: &ConformError) -> Self {
        let status = if err.is_test_failure() {
            CaseStatus::Fail
        } else {
            CaseStatus::Error
        };
        Self::new(name, suite, status, duration).with_message(&err.to_string())
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, CaseStatus::Fail | CaseStatus::Error)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Escapes the five XML special characters for attribute and text content.
fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub name: String,
    pub timestamp: u64,
    pub duration: Duration,
    pub cases: Vec<CaseResult>,
}

impl SuiteReport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            timestamp: unix_now(),
            duration: Duration::default(),
            cases: vec![],
        }
    }

    pub fn add_result(&mut self, result: CaseResult) {
        self.cases.push(result);
    }

    fn count(&self, status: CaseStatus) -> usize {
        self.cases.iter().filter(|c| c.status == status).count()
    }

    pub fn passed(&self) -> usize {
        self.count(CaseStatus::Pass)
    }

    pub fn failed(&self) -> usize {
        self.count(CaseStatus::Fail)
    }

    pub fn errors(&self) -> usize {
        self.count(CaseStatus::Error)
    }

    pub fn skipped(&self) -> usize {
        self.count(CaseStatus::Skip)
    }

    pub fn total(&self) -> usize {
        self.cases.len()
    }

    pub fn is_passing(&self) -> bool {
        self.failed() == 0 && self.errors() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.cases.iter().filter(|c| c.is_failure())
    }

    fn write_junit(&self, xml: &mut String) {
        xml.push_str(&format!(
            "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{:.3}\">\n",
            xml_escape(&self.name),
            self.total(),
            self.failed(),
            self.errors(),
            self.skipped(),
            self.duration.as_secs_f64()
        ));

        for case in &self.cases {
            xml.push_str(&format!(
                "    <testcase name=\"{}\" classname=\"{}\" time=\"{:.3}\"",
                xml_escape(&case.name),
                xml_escape(&case.suite),
                case.duration.as_secs_f64()
            ));
            let message = case.message.as_deref().map(xml_escape);
            match case.status {
                CaseStatus::Pass => xml.push_str(" />\n"),
                CaseStatus::Skip => xml.push_str(">\n      <skipped />\n    </testcase>\n"),
                CaseStatus::Fail | CaseStatus::Error => {
                    let tag = if case.status == CaseStatus::Fail {
                        "failure"
                    } else {
                        "error"
                    };
                    let message = message.unwrap_or_else(|| "case failed".to_string());
                    xml.push_str(&format!(
                        ">\n      <{tag} message=\"{msg}\">{msg}</{tag}>\n    </testcase>\n",
                        tag = tag,
                        msg = message
                    ));
                }
            }
        }

        xml.push_str("  </testsuite>\n");
    }

    /// `dir_entry: PASS 12/12 in 0.03s`, or the FAIL form with counts.
    pub fn summary_line(&self) -> String {
        let total = self.total();
        let passed = self.passed();
        let broken = self.failed() + self.errors();
        let skipped = self.skipped();
        let time = self.duration.as_secs_f64();

        if broken > 0 {
            format!(
                "{}: FAIL {}/{} ({} failed, {} skipped) in {:.2}s",
                self.name, passed, total, broken, skipped, time
            )
        } else if skipped > 0 {
            format!(
                "{}: PASS {}/{} ({} skipped) in {:.2}s",
                self.name, passed, total, skipped, time
            )
        } else {
            format!("{}: PASS {}/{} in {:.2}s", self.name, passed, total, time)
        }
    }
}

/// Every suite of one run against one directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub target: String,
    pub backend: String,
    pub generated_at: u64,
    pub suites: Vec<SuiteReport>,
}

impl RunReport {
    pub fn new(target: &str, backend: &str) -> Self {
        Self {
            target: target.to_string(),
            backend: backend.to_string(),
            generated_at: unix_now(),
            suites: vec![],
        }
    }

    pub fn add_suite(&mut self, suite: SuiteReport) {
        self.suites.push(suite);
    }

    pub fn total_passed(&self) -> usize {
        self.suites.iter().map(|s| s.passed()).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.suites.iter().map(|s| s.failed() + s.errors()).sum()
    }

    pub fn total_cases(&self) -> usize {
        self.suites.iter().map(|s| s.total()).sum()
    }

    pub fn is_passing(&self) -> bool {
        self.suites.iter().all(|s| s.is_passing())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_junit_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!(
            "<testsuites name=\"fsconform\" tests=\"{}\" failures=\"{}\">\n",
            self.total_cases(),
            self.total_failed()
        ));
        for suite in &self.suites {
            suite.write_junit(&mut xml);
        }
        xml.push_str("</testsuites>\n");
        xml
    }

    pub fn summary_lines(&self) -> Vec<String> {
        self.suites.iter().map(|s| s.summary_line()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::NtStatus;

    fn suite_with(statuses: &[CaseStatus]) -> SuiteReport {
        let mut suite = SuiteReport::new("dir_entry");
        for (i, status) in statuses.iter().enumerate() {
            suite.add_result(CaseResult::new(
                &format!("case{}", i),
                "dir_entry",
                *status,
                Duration::default(),
            ));
        }
        suite
    }

    #[test]
    fn test_counts() {
        let suite = suite_with(&[
            CaseStatus::Pass,
            CaseStatus::Pass,
            CaseStatus::Fail,
            CaseStatus::Error,
            CaseStatus::Skip,
        ]);
        assert_eq!(suite.total(), 5);
        assert_eq!(suite.passed(), 2);
        assert_eq!(suite.failed(), 1);
        assert_eq!(suite.errors(), 1);
        assert_eq!(suite.skipped(), 1);
        assert!(!suite.is_passing());
        assert_eq!(suite.failures().count(), 2);
    }

    #[test]
    fn test_from_error_classifies() {
        let fail = CaseResult::from_error(
            "x",
            "s",
            Duration::default(),
            &ConformError::EntryCount {
                actual: 0,
                expected: 1,
            },
        );
        assert_eq!(fail.status, CaseStatus::Fail);
        assert_eq!(fail.message.as_deref(), Some("0 entries returned, expected 1"));

        let error = CaseResult::from_error(
            "x",
            "s",
            Duration::default(),
            &ConformError::OsCall {
                status: NtStatus::ACCESS_DENIED,
            },
        );
        assert_eq!(error.status, CaseStatus::Error);
    }

    #[test]
    fn test_summary_line_passing() {
        let mut suite = suite_with(&[CaseStatus::Pass, CaseStatus::Pass]);
        suite.duration = Duration::from_millis(1234);
        assert_eq!(suite.summary_line(), "dir_entry: PASS 2/2 in 1.23s");
    }

    #[test]
    fn test_summary_line_failing() {
        let suite = suite_with(&[CaseStatus::Pass, CaseStatus::Error, CaseStatus::Skip]);
        assert_eq!(
            suite.summary_line(),
            "dir_entry: FAIL 1/3 (1 failed, 1 skipped) in 0.00s"
        );
    }

    #[test]
    fn test_junit_escapes_messages() {
        let mut suite = SuiteReport::new("dir_entry");
        suite.add_result(
            CaseResult::new("a<b>", "dir_entry", CaseStatus::Fail, Duration::default())
                .with_message("FileName was \"x\", expected \"y\"."),
        );
        let mut run = RunReport::new("C:\\test", "synthetic");
        run.add_suite(suite);
        let xml = run.to_junit_xml();
        assert!(xml.contains("name=\"a&lt;b&gt;\""));
        assert!(xml.contains("<failure message=\"FileName was &quot;x&quot;"));
        assert!(xml.ends_with("</testsuites>\n"));
    }

    #[test]
    fn test_junit_error_and_skip_elements() {
        let mut run = RunReport::new("dir", "synthetic");
        run.add_suite(suite_with(&[CaseStatus::Error, CaseStatus::Skip, CaseStatus::Pass]));
        let xml = run.to_junit_xml();
        assert!(xml.contains("<error message=\"case failed\">"));
        assert!(xml.contains("<skipped />"));
        assert!(xml.contains("errors=\"1\""));
    }

    #[test]
    fn test_run_report_json() {
        let mut run = RunReport::new("dir", "synthetic");
        run.add_suite(suite_with(&[CaseStatus::Pass, CaseStatus::Fail]));
        run.add_suite(suite_with(&[CaseStatus::Pass]));
        assert_eq!(run.total_cases(), 3);
        assert_eq!(run.total_passed(), 2);
        assert_eq!(run.total_failed(), 1);
        assert!(!run.is_passing());

        let json = run.to_json().unwrap();
        assert!(json.contains("\"status\": \"fail\""));
        let parsed = RunReport::from_json(&json).unwrap();
        assert_eq!(parsed.suites.len(), 2);
        assert_eq!(parsed.backend, "synthetic");
    }
}
