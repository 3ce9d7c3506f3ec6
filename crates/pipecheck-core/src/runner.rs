//! Suite selection and execution.
//!
//! Sequential mode hands the [`Reporter`] to each suite in turn. Parallel
//! mode gives every suite its own [`SuiteBuffer`], runs them concurrently
//! and merges the buffers in declared order, so the final report does not
//! depend on which suite finished first.
//!
//! On cancellation a check suite stops at once. The pipeline scenario stops
//! polling but still removes its test document if it was already indexed.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::live::LiveContext;
use crate::obs::emit_run_cancelled;
use crate::reporter::{Reporter, ResultSink, SuiteBuffer};
use crate::scenario::{PipelineScenario, ScenarioState, Stage};
use crate::suite::{Suite, SuiteKind};
use crate::suites;
use crate::token::PipelineToken;

/// How suites are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Sequential,
    Parallel,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Sequential => "sequential",
            RunMode::Parallel => "parallel",
        }
    }
}

/// Something the harness can run against a sink.
pub enum Runnable {
    Checks(Suite),
    Scenario(PipelineScenario),
}

impl Runnable {
    pub fn kind(&self) -> SuiteKind {
        match self {
            Runnable::Checks(suite) => suite.kind(),
            Runnable::Scenario(_) => SuiteKind::Pipeline,
        }
    }

    pub fn check_count(&self) -> usize {
        match self {
            Runnable::Checks(suite) => suite.len(),
            Runnable::Scenario(_) => Stage::ALL.len(),
        }
    }

    /// Returns `false` if `cancel` fired before the run finished.
    pub async fn run(&self, sink: &mut dyn ResultSink, cancel: &CancellationToken) -> bool {
        match self {
            Runnable::Checks(suite) => tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = suite.run(sink) => true,
            },
            Runnable::Scenario(scenario) => {
                let report = scenario
                    .run_until_cancelled(PipelineToken::generate(), sink, cancel)
                    .await;
                !matches!(report.state, ScenarioState::Interrupted(_))
            }
        }
    }
}

/// An ordered plan of suites.
pub struct Harness {
    plan: Vec<Runnable>,
}

impl Harness {
    pub fn new(plan: Vec<Runnable>) -> Self {
        Self { plan }
    }

    /// Live suites for `selection`, in the order given.
    pub fn live(selection: &[SuiteKind], ctx: &LiveContext) -> Self {
        Self::new(
            selection
                .iter()
                .map(|kind| suites::build(*kind, ctx))
                .collect(),
        )
    }

    pub fn kinds(&self) -> Vec<SuiteKind> {
        self.plan.iter().map(Runnable::kind).collect()
    }

    /// Run the plan. Cancellation keeps every result recorded so far and
    /// adds a note naming what was not finished.
    pub async fn run(&self, mode: RunMode, cancel: &CancellationToken) -> Reporter {
        info!(
            mode = mode.as_str(),
            suites = self.plan.len(),
            "starting harness run"
        );
        match mode {
            RunMode::Sequential => self.run_sequential(cancel).await,
            RunMode::Parallel => self.run_parallel(cancel).await,
        }
    }

    async fn run_sequential(&self, cancel: &CancellationToken) -> Reporter {
        let mut reporter = Reporter::new();

        for (finished, runnable) in self.plan.iter().enumerate() {
            if cancel.is_cancelled() || !runnable.run(&mut reporter, cancel).await {
                emit_run_cancelled(RunMode::Sequential.as_str(), finished, self.plan.len());
                let skipped: Vec<&str> = self.plan[finished..]
                    .iter()
                    .map(|r| r.kind().name())
                    .collect();
                reporter.note(format!(
                    "run cancelled; not finished: {}",
                    skipped.join(", ")
                ));
                break;
            }
        }

        reporter
    }

    async fn run_parallel(&self, cancel: &CancellationToken) -> Reporter {
        let mut buffers: Vec<SuiteBuffer> = self
            .plan
            .iter()
            .map(|runnable| SuiteBuffer::new(runnable.kind()))
            .collect();

        let completed: Vec<bool> = join_all(
            self.plan
                .iter()
                .zip(buffers.iter_mut())
                .map(|(runnable, buffer)| runnable.run(buffer, cancel)),
        )
        .await;

        let mut reporter = Reporter::new();
        for buffer in buffers {
            reporter.absorb(buffer);
        }

        let finished = completed.iter().filter(|done| **done).count();
        if finished < self.plan.len() {
            emit_run_cancelled(RunMode::Parallel.as_str(), finished, self.plan.len());
            reporter.note(format!(
                "run cancelled; {} of {} suites finished, in-flight suites interrupted",
                finished,
                self.plan.len()
            ));
        }

        reporter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{Check, Interpretation};
    use crate::fakes::ScriptedProbe;
    use crate::outcome::{Outcome, Verdict};
    use crate::poller::RetryPolicy;

    fn one_check(kind: SuiteKind, name: &str, outcome: Outcome) -> Runnable {
        Runnable::Checks(Suite::new(kind).with_check(Check::new(
            name,
            ScriptedProbe::always(name, outcome),
            RetryPolicy::once(),
            Interpretation::required(format!("{name} failed")),
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_merges_in_declared_order() {
        let harness = Harness::new(vec![
            one_check(SuiteKind::Kafka, "broker", Outcome::success("up")),
            one_check(SuiteKind::Api, "health", Outcome::Absent),
        ]);
        let reporter = harness
            .run(RunMode::Parallel, &CancellationToken::new())
            .await;

        let suites: Vec<_> = reporter.checks().iter().map(|c| c.suite).collect();
        assert_eq!(suites, vec![Some(SuiteKind::Kafka), Some(SuiteKind::Api)]);
        assert_eq!(reporter.checks()[1].result.verdict, Verdict::Fail);
        assert!(reporter.notes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let harness = Harness::new(vec![one_check(
            SuiteKind::Kafka,
            "broker",
            Outcome::success("up"),
        )]);
        let reporter = harness.run(RunMode::Sequential, &cancel).await;

        assert!(reporter.checks().is_empty());
        assert_eq!(reporter.notes(), ["run cancelled; not finished: kafka".to_string()]);
    }

    #[test]
    fn run_mode_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(RunMode::Parallel).expect("serialize"),
            "parallel"
        );
    }
}
