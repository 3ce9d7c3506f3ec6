use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::reporter::{RecordedCheck, Reporter};
use crate::runner::RunMode;
use crate::suite::SuiteKind;

pub const RUN_REPORT_SCHEMA_VERSION: &str = "1.0";

/// Counts section of the run report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummaryArtifact {
    pub pass_count: usize,
    pub fail_count: usize,
    pub warn_count: usize,
    pub total: usize,
    pub failed_names: Vec<String>,
    pub exit_code: i32,
}

/// Machine-readable record of one harness run, written for CI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunReport {
    pub schema_version: String,
    pub generated_at: DateTime<Utc>,
    pub mode: RunMode,
    pub suites: Vec<SuiteKind>,
    pub summary: RunSummaryArtifact,
    pub notes: Vec<String>,
    pub checks: Vec<RecordedCheck>,
}

impl RunReport {
    /// Snapshot a reporter before it is finalized.
    pub fn from_reporter(reporter: &Reporter, mode: RunMode, suites: Vec<SuiteKind>) -> Self {
        let state = reporter.state();
        Self {
            schema_version: RUN_REPORT_SCHEMA_VERSION.to_string(),
            generated_at: Utc::now(),
            mode,
            suites,
            summary: RunSummaryArtifact {
                pass_count: state.pass_count,
                fail_count: state.fail_count,
                warn_count: state.warn_count,
                total: state.total(),
                failed_names: state.failed_names.clone(),
                exit_code: state.exit_code(),
            },
            notes: reporter.notes().to_vec(),
            checks: reporter.checks().to_vec(),
        }
    }
}

/// Write the run report in pretty JSON format.
pub fn write_run_report_json(path: &Path, report: &RunReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report).context("serialize run report")?;
    std::fs::write(path, content).with_context(|| format!("write {:?}", path))?;
    Ok(())
}
