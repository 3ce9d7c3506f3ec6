//! Pipecheck Core Library
//!
//! Probes, retry polling, check classification and reporting for validating a
//! CDC search pipeline (SQL Server -> Debezium -> Kafka -> OpenSearch -> API).

pub mod check;
pub mod config;
pub mod error;
pub mod fakes;
pub mod live;
pub mod obs;
pub mod outcome;
pub mod poller;
pub mod probe;
pub mod probes;
pub mod reporter;
pub mod reporting;
pub mod runner;
pub mod scenario;
pub mod suite;
pub mod suites;
pub mod telemetry;
pub mod token;

pub use check::{Check, Interpretation};
pub use config::{EndpointConfig, HarnessConfig, KafkaConfig, SqlConfig};
pub use error::{HarnessError, ProbeError, Result};
pub use live::{LiveContext, LivePipelineBackend};
pub use outcome::{CheckResult, Outcome, Verdict};
pub use poller::{poll, PollResult, RetryPolicy};
pub use probe::Probe;
pub use reporter::{RecordedCheck, ReportState, Reporter, ResultSink, SuiteBuffer, Summary};
pub use reporting::{write_run_report_json, RunReport, RunSummaryArtifact};
pub use runner::{Harness, RunMode, Runnable};
pub use scenario::{
    PipelineBackend, PipelineScenario, ScenarioReport, ScenarioState, Stage, StagePolicies,
    ALL_STAGES_PASSED,
};
pub use suite::{Suite, SuiteKind};
pub use telemetry::init_tracing;
pub use token::PipelineToken;
