//! Accumulation of check results and the final exit status.
//!
//! Suites stream results into a [`ResultSink`]. The [`Reporter`] is the
//! single owner of the run's [`ReportState`]; when suites run concurrently
//! each gets an isolated [`SuiteBuffer`] that is merged into the reporter
//! afterwards, in declared suite order.

use serde::{Deserialize, Serialize};

use crate::obs::emit_check_recorded;
use crate::outcome::{CheckResult, Verdict};
use crate::suite::SuiteKind;

/// Destination for check results as they complete.
pub trait ResultSink: Send {
    /// Mark the start of a suite; later results belong to it.
    fn begin_suite(&mut self, suite: SuiteKind);

    /// Record one classified check.
    fn record(&mut self, result: CheckResult);

    /// Attach a free-form line to the summary.
    fn note(&mut self, note: String);
}

/// Tallies mutated only through [`ReportState::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportState {
    pub pass_count: usize,
    pub fail_count: usize,
    pub warn_count: usize,
    /// Names of failed checks, in the order they were recorded.
    pub failed_names: Vec<String>,
}

impl ReportState {
    fn apply(&mut self, result: &CheckResult) {
        match result.verdict {
            Verdict::Pass => self.pass_count += 1,
            Verdict::Warn => self.warn_count += 1,
            Verdict::Fail => {
                self.fail_count += 1;
                self.failed_names.push(result.name.clone());
            }
        }
    }

    pub fn total(&self) -> usize {
        self.pass_count + self.fail_count + self.warn_count
    }

    /// 0 iff nothing failed. Warnings are advisory.
    pub fn exit_code(&self) -> i32 {
        if self.fail_count == 0 {
            0
        } else {
            1
        }
    }
}

/// A check result tagged with the suite that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedCheck {
    pub suite: Option<SuiteKind>,
    #[serde(flatten)]
    pub result: CheckResult,
}

/// Rendered summary and process exit status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    pub exit_code: i32,
}

/// Owner of the run-wide accumulator.
#[derive(Debug, Default)]
pub struct Reporter {
    state: ReportState,
    checks: Vec<RecordedCheck>,
    notes: Vec<String>,
    current_suite: Option<SuiteKind>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ReportState {
        &self.state
    }

    pub fn checks(&self) -> &[RecordedCheck] {
        &self.checks
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Merge a suite buffer filled by an isolated task.
    pub fn absorb(&mut self, buffer: SuiteBuffer) {
        self.begin_suite(buffer.suite);
        for result in buffer.results {
            self.record(result);
        }
        for note in buffer.notes {
            self.note(note);
        }
    }

    /// One line per check, grouped under a header per suite.
    pub fn render_results(&self) -> String {
        let mut out = String::new();
        let mut current: Option<Option<SuiteKind>> = None;
        for entry in &self.checks {
            if current != Some(entry.suite) {
                if current.is_some() {
                    out.push('\n');
                }
                let header = entry.suite.map(|s| s.name()).unwrap_or("checks");
                out.push_str(&format!("== {} ==\n", header));
                current = Some(entry.suite);
            }
            out.push_str(&entry.result.render_line());
            out.push('\n');
        }
        out
    }

    /// Consume the reporter, producing the summary text and exit code.
    pub fn finalize(self) -> Summary {
        let state = &self.state;
        let rule = "=".repeat(60);
        let mut text = String::new();

        text.push_str(&format!("{rule}\n Pipeline validation summary\n{rule}\n"));
        text.push_str(&format!(
            " PASS: {}   FAIL: {}   WARN: {}   (total {})\n",
            state.pass_count,
            state.fail_count,
            state.warn_count,
            state.total()
        ));

        if !state.failed_names.is_empty() {
            text.push_str("\n Failed checks:\n");
            for name in &state.failed_names {
                text.push_str(&format!("   - {}\n", name));
            }
        }

        if !self.notes.is_empty() {
            text.push_str("\n Notes:\n");
            for note in &self.notes {
                text.push_str(&format!("   - {}\n", note));
            }
        }

        let exit_code = state.exit_code();
        let verdict = if exit_code == 0 { "PASSED" } else { "FAILED" };
        text.push_str(&format!("{rule}\n RESULT: {}\n", verdict));

        Summary { text, exit_code }
    }
}

impl ResultSink for Reporter {
    fn begin_suite(&mut self, suite: SuiteKind) {
        self.current_suite = Some(suite);
    }

    fn record(&mut self, result: CheckResult) {
        emit_check_recorded(self.current_suite, &result);
        self.state.apply(&result);
        self.checks.push(RecordedCheck {
            suite: self.current_suite,
            result,
        });
    }

    fn note(&mut self, note: String) {
        self.notes.push(note);
    }
}

/// Per-suite buffer used when suites run concurrently.
#[derive(Debug)]
pub struct SuiteBuffer {
    suite: SuiteKind,
    results: Vec<CheckResult>,
    notes: Vec<String>,
}

impl SuiteBuffer {
    pub fn new(suite: SuiteKind) -> Self {
        Self {
            suite,
            results: Vec::new(),
            notes: Vec::new(),
        }
    }
}

impl ResultSink for SuiteBuffer {
    fn begin_suite(&mut self, suite: SuiteKind) {
        self.suite = suite;
    }

    fn record(&mut self, result: CheckResult) {
        self.results.push(result);
    }

    fn note(&mut self, note: String) {
        self.notes.push(note);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_run_exits_zero() {
        let summary = Reporter::new().finalize();
        assert_eq!(summary.exit_code, 0);
        assert!(summary.text.contains("PASS: 0   FAIL: 0   WARN: 0"));
    }

    #[test]
    fn warnings_do_not_fail_the_run() {
        let mut reporter = Reporter::new();
        reporter.begin_suite(SuiteKind::Opensearch);
        reporter.record(CheckResult::pass("index exists", "profiles"));
        reporter.record(CheckResult::warn("cluster health", "yellow"));

        assert_eq!(reporter.state().warn_count, 1);
        let summary = reporter.finalize();
        assert_eq!(summary.exit_code, 0);
        assert!(summary.text.contains("RESULT: PASSED"));
    }

    #[test]
    fn failed_names_keep_record_order() {
        let mut reporter = Reporter::new();
        reporter.record(CheckResult::fail("second", "x"));
        reporter.record(CheckResult::pass("ok", "y"));
        reporter.record(CheckResult::fail("first", "z"));

        assert_eq!(reporter.state().failed_names, vec!["second", "first"]);
        let summary = reporter.finalize();
        assert_eq!(summary.exit_code, 1);
        let second = summary.text.find("- second").expect("second listed");
        let first = summary.text.find("- first").expect("first listed");
        assert!(second < first);
    }

    #[test]
    fn absorb_preserves_suite_attribution() {
        let mut buffer = SuiteBuffer::new(SuiteKind::Api);
        buffer.record(CheckResult::pass("root", "Search API"));
        buffer.note("api note".to_string());

        let mut reporter = Reporter::new();
        reporter.absorb(buffer);

        assert_eq!(reporter.checks()[0].suite, Some(SuiteKind::Api));
        assert_eq!(reporter.notes(), ["api note".to_string()]);
    }

    #[test]
    fn render_results_groups_by_suite() {
        let mut reporter = Reporter::new();
        reporter.begin_suite(SuiteKind::Kafka);
        reporter.record(CheckResult::pass("broker", "1 broker"));
        reporter.begin_suite(SuiteKind::Api);
        reporter.record(CheckResult::fail("health", "503"));

        let rendered = reporter.render_results();
        assert_eq!(
            rendered,
            "== kafka ==\n[PASS] broker: 1 broker\n\n== api ==\n[FAIL] health: 503\n"
        );
    }
}
