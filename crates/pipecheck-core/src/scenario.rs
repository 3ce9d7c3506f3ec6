//! End-to-end propagation of one injected row.
//!
//! The scenario writes a row carrying a fresh [`PipelineToken`] into the
//! source database and follows it through change capture, the broker, the
//! search index and the query API:
//!
//! ```text
//! INSERTED -> CAPTURED -> PUBLISHED -> INDEXED -> QUERIED
//!     \__________\___________\___________\__________\--> BLOCKED(stage)
//! ```
//!
//! Each stage consumes what the previous one produced, so the first stage
//! that exhausts its retry budget blocks the scenario and no later stage is
//! probed. The failing stage's result names what an operator should inspect.
//!
//! Once INDEXED has been observed the injected document exists, so cleanup
//! runs on every exit from that point on, including cancellation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::check::Interpretation;
use crate::obs::{
    emit_pipeline_cleanup, emit_stage_transition, emit_suite_finished, emit_suite_started,
    suite_span,
};
use crate::outcome::{CheckResult, Outcome};
use crate::poller::{poll, RetryPolicy};
use crate::probe::Probe;
use crate::reporter::ResultSink;
use crate::suite::SuiteKind;
use crate::token::PipelineToken;

/// Note recorded when every stage passed.
pub const ALL_STAGES_PASSED: &str = "ALL 5 PIPELINE STEPS PASSED";

/// One hop of the pipeline, in propagation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Inserted,
    Captured,
    Published,
    Indexed,
    Queried,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Inserted,
        Stage::Captured,
        Stage::Published,
        Stage::Indexed,
        Stage::Queried,
    ];

    /// 1-based position in the chain.
    pub fn ordinal(&self) -> usize {
        match self {
            Stage::Inserted => 1,
            Stage::Captured => 2,
            Stage::Published => 3,
            Stage::Indexed => 4,
            Stage::Queried => 5,
        }
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            Stage::Inserted => "INSERTED",
            Stage::Captured => "CAPTURED",
            Stage::Published => "PUBLISHED",
            Stage::Indexed => "INDEXED",
            Stage::Queried => "QUERIED",
        }
    }

    pub fn check_name(&self) -> &'static str {
        match self {
            Stage::Inserted => "INSERT test row into SQL Server",
            Stage::Captured => "CDC captures the INSERT",
            Stage::Published => "Kafka receives the CDC event",
            Stage::Indexed => "OpenSearch indexes the document",
            Stage::Queried => "API returns the new profile",
        }
    }

    fn failure_context(&self, token: &PipelineToken) -> String {
        match self {
            Stage::Inserted => format!("INSERT failed for email={}", token.derived_email),
            Stage::Captured => format!("CDC did not capture the INSERT for email={}", token.derived_email),
            Stage::Published => format!("Kafka did not receive the CDC event for email={}", token.derived_email),
            Stage::Indexed => format!("OpenSearch did not index the document for email={}", token.derived_email),
            Stage::Queried => format!("API search did not return name={:?}", token.derived_name),
        }
    }

    /// Where to look when this stage blocks.
    pub fn inspect_hint(&self) -> &'static str {
        match self {
            Stage::Inserted => "SQL Server connectivity, credentials and the source table schema",
            Stage::Captured => "SQL Server Agent and the CDC capture job for the source table",
            Stage::Published => "the Debezium connector and its tasks in Kafka Connect",
            Stage::Indexed => "the indexer consumer group and OpenSearch write errors",
            Stage::Queried => "the search API /search endpoint and its OpenSearch client",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.state_name())
    }
}

/// Where the scenario stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioState {
    /// Token generated, nothing attempted yet.
    Started,
    /// The stage was observed; `Reached(Queried)` is the only terminal success.
    Reached(Stage),
    /// The stage exhausted its retries; terminal failure.
    Blocked(Stage),
    /// The run was cancelled while polling the stage.
    Interrupted(Stage),
}

impl ScenarioState {
    pub fn name(&self) -> String {
        match self {
            ScenarioState::Started => "STARTED".to_string(),
            ScenarioState::Reached(stage) => stage.state_name().to_string(),
            ScenarioState::Blocked(stage) => format!("BLOCKED({})", stage.state_name()),
            ScenarioState::Interrupted(stage) => format!("INTERRUPTED({})", stage.state_name()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScenarioState::Reached(Stage::Queried))
    }

    /// Whether the injected document reached the search index.
    pub fn document_indexed(&self) -> bool {
        match self {
            ScenarioState::Started => false,
            ScenarioState::Reached(stage) => *stage >= Stage::Indexed,
            ScenarioState::Blocked(stage) | ScenarioState::Interrupted(stage) => {
                *stage > Stage::Indexed
            }
        }
    }
}

/// Access to the five pipeline stages and to cleanup of injected data.
///
/// `observe` performs one attempt for `stage`; for `Stage::Inserted` that is
/// the write itself.
#[async_trait]
pub trait PipelineBackend: Send + Sync {
    /// Human-readable resource behind a stage, used in logs and messages.
    fn describe(&self, stage: Stage) -> String;

    async fn observe(&self, stage: Stage, token: &PipelineToken) -> Outcome;

    /// Remove the injected document from the search index. Best effort.
    async fn cleanup(&self, token: &PipelineToken) -> Outcome;
}

/// Adapts one stage of a backend to the [`Probe`] interface.
struct StageProbe<'a> {
    backend: &'a dyn PipelineBackend,
    stage: Stage,
    token: &'a PipelineToken,
}

#[async_trait]
impl Probe for StageProbe<'_> {
    fn target(&self) -> String {
        self.backend.describe(self.stage)
    }

    async fn observe(&self) -> Outcome {
        self.backend.observe(self.stage, self.token).await
    }
}

/// Retry budgets per stage. Later stages need more patience because
/// propagation latency compounds downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePolicies {
    pub insert: RetryPolicy,
    pub capture: RetryPolicy,
    pub publish: RetryPolicy,
    pub index: RetryPolicy,
    pub query: RetryPolicy,
}

impl StagePolicies {
    pub fn for_stage(&self, stage: Stage) -> &RetryPolicy {
        match stage {
            Stage::Inserted => &self.insert,
            Stage::Captured => &self.capture,
            Stage::Published => &self.publish,
            Stage::Indexed => &self.index,
            Stage::Queried => &self.query,
        }
    }

    /// Every stage gets the same policy.
    pub fn uniform(policy: RetryPolicy) -> Self {
        Self {
            insert: policy,
            capture: policy,
            publish: policy,
            index: policy,
            query: policy,
        }
    }
}

/// Final state of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub token: PipelineToken,
    pub state: ScenarioState,
}

/// The chained INSERT -> QUERIED check.
pub struct PipelineScenario {
    backend: Arc<dyn PipelineBackend>,
    policies: StagePolicies,
}

impl PipelineScenario {
    pub fn new(backend: Arc<dyn PipelineBackend>, policies: StagePolicies) -> Self {
        Self { backend, policies }
    }

    /// Run with a freshly generated token.
    pub async fn run(&self, sink: &mut dyn ResultSink) -> ScenarioReport {
        self.run_with_token(PipelineToken::generate(), sink).await
    }

    /// Run with a caller-supplied token.
    pub async fn run_with_token(
        &self,
        token: PipelineToken,
        sink: &mut dyn ResultSink,
    ) -> ScenarioReport {
        self.run_until_cancelled(token, sink, &CancellationToken::new())
            .await
    }

    /// Run until the last stage or until `cancel` fires. A cancelled stage
    /// is not recorded; cleanup still runs if the document was indexed.
    pub async fn run_until_cancelled(
        &self,
        token: PipelineToken,
        sink: &mut dyn ResultSink,
        cancel: &CancellationToken,
    ) -> ScenarioReport {
        async {
            emit_suite_started(SuiteKind::Pipeline, Stage::ALL.len());
            sink.begin_suite(SuiteKind::Pipeline);

            let state = self.advance(&token, sink, cancel).await;

            if state.document_indexed() {
                self.cleanup(&token).await;
            }

            let failed = usize::from(matches!(state, ScenarioState::Blocked(_)));
            emit_suite_finished(SuiteKind::Pipeline, Stage::ALL.len(), failed);

            ScenarioReport { token, state }
        }
        .instrument(suite_span(SuiteKind::Pipeline))
        .await
    }

    async fn advance(
        &self,
        token: &PipelineToken,
        sink: &mut dyn ResultSink,
        cancel: &CancellationToken,
    ) -> ScenarioState {
        let mut state = ScenarioState::Started;

        for stage in Stage::ALL {
            let probe = StageProbe {
                backend: self.backend.as_ref(),
                stage,
                token,
            };
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                polled = poll(&probe, self.policies.for_stage(stage)) => Some(polled),
            };
            let Some(polled) = polled else {
                let interrupted = ScenarioState::Interrupted(stage);
                emit_stage_transition(&token.correlation_id, &state.name(), &interrupted.name());
                return interrupted;
            };

            match polled.outcome {
                Outcome::Success(detail) => {
                    emit_stage_transition(&token.correlation_id, &state.name(), stage.state_name());
                    sink.record(CheckResult::pass(stage.check_name(), detail));
                    state = ScenarioState::Reached(stage);
                }
                other => {
                    let rules = Interpretation::required(stage.failure_context(token));
                    let (verdict, message) = rules.classify(&other, polled.attempts);
                    let message = format!(
                        "{} over {:.1}s; BLOCKED at {}, inspect {}",
                        message,
                        polled.elapsed.as_secs_f64(),
                        stage.state_name(),
                        stage.inspect_hint()
                    );
                    sink.record(CheckResult::new(stage.check_name(), verdict, message));

                    let blocked = ScenarioState::Blocked(stage);
                    emit_stage_transition(&token.correlation_id, &state.name(), &blocked.name());
                    sink.note(format!(
                        "PIPELINE BLOCKED at stage {}/5 ({}): inspect {}",
                        stage.ordinal(),
                        stage.state_name(),
                        stage.inspect_hint()
                    ));
                    return blocked;
                }
            }
        }

        sink.note(format!(
            "{} (correlation_id={})",
            ALL_STAGES_PASSED, token.correlation_id
        ));
        state
    }

    async fn cleanup(&self, token: &PipelineToken) {
        match self.backend.cleanup(token).await {
            Outcome::Success(detail) => emit_pipeline_cleanup(&token.correlation_id, true, &detail),
            Outcome::Absent => {
                emit_pipeline_cleanup(&token.correlation_id, true, "nothing to delete")
            }
            Outcome::Error(err) => {
                emit_pipeline_cleanup(&token.correlation_id, false, &err.to_string())
            }
        }
    }
}
