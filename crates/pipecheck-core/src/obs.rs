//! Structured observability hooks for harness runs.
//!
//! This module provides:
//! - Suite-scoped tracing spans via [`suite_span`]
//! - Emission functions for key events: suite start/finish, check recorded,
//!   pipeline stage transitions, cleanup and cancellation
//!
//! Events are emitted at `info!` level unless they signal a problem.

use tracing::{info, warn};

use crate::outcome::{CheckResult, Verdict};
use crate::suite::SuiteKind;

/// Span tagged with the suite name; attach with `Instrument::instrument`.
pub fn suite_span(suite: SuiteKind) -> tracing::Span {
    tracing::info_span!("pipecheck.suite", suite = %suite)
}

/// Emit event: suite started with its check count.
pub fn emit_suite_started(suite: SuiteKind, checks: usize) {
    info!(event = "suite.started", suite = %suite, checks = checks);
}

/// Emit event: suite finished.
pub fn emit_suite_finished(suite: SuiteKind, checks: usize, failed: usize) {
    info!(event = "suite.finished", suite = %suite, checks = checks, failed = failed);
}

/// Emit event: a check result was recorded.
pub fn emit_check_recorded(suite: Option<SuiteKind>, result: &CheckResult) {
    let suite = suite.map(|s| s.name()).unwrap_or("-");
    match result.verdict {
        Verdict::Pass => info!(
            event = "check.recorded",
            suite = suite,
            check = %result.name,
            verdict = %result.verdict,
            message = %result.message,
        ),
        Verdict::Warn | Verdict::Fail => warn!(
            event = "check.recorded",
            suite = suite,
            check = %result.name,
            verdict = %result.verdict,
            message = %result.message,
        ),
    }
}

/// Emit event: the pipeline scenario moved between states.
pub fn emit_stage_transition(correlation_id: &str, from: &str, to: &str) {
    info!(
        event = "stage.transition",
        correlation_id = %correlation_id,
        from = from,
        to = to,
    );
}

/// Emit event: best-effort cleanup of injected data finished.
pub fn emit_pipeline_cleanup(correlation_id: &str, succeeded: bool, detail: &str) {
    if succeeded {
        info!(event = "pipeline.cleanup", correlation_id = %correlation_id, detail = %detail);
    } else {
        warn!(event = "pipeline.cleanup", correlation_id = %correlation_id, detail = %detail);
    }
}

/// Emit event: the run was cancelled before every suite finished.
pub fn emit_run_cancelled(mode: &str, finished: usize, planned: usize) {
    warn!(event = "run.cancelled", mode = mode, finished = finished, planned = planned);
}
