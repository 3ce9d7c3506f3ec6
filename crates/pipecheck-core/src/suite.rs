//! Ordered groups of checks scoped to one subsystem.

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::check::Check;
use crate::obs::{emit_suite_finished, emit_suite_started, suite_span};
use crate::outcome::Verdict;
use crate::reporter::ResultSink;

/// The fixed set of suites the harness knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteKind {
    /// Source database reachability and change-capture configuration
    Sqlserver,
    /// Broker reachability, CDC topic, produce/consume
    Kafka,
    /// Search cluster health and the target index
    Opensearch,
    /// Kafka Connect and the Debezium connector
    Debezium,
    /// The search API surface
    Api,
    /// Prometheus and Grafana
    Monitoring,
    /// End-to-end propagation of one injected row
    Pipeline,
}

impl SuiteKind {
    /// Every suite, in the order `all` runs them.
    pub fn all() -> Vec<SuiteKind> {
        vec![
            SuiteKind::Sqlserver,
            SuiteKind::Kafka,
            SuiteKind::Opensearch,
            SuiteKind::Debezium,
            SuiteKind::Api,
            SuiteKind::Monitoring,
            SuiteKind::Pipeline,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SuiteKind::Sqlserver => "sqlserver",
            SuiteKind::Kafka => "kafka",
            SuiteKind::Opensearch => "opensearch",
            SuiteKind::Debezium => "debezium",
            SuiteKind::Api => "api",
            SuiteKind::Monitoring => "monitoring",
            SuiteKind::Pipeline => "pipeline",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SuiteKind::Sqlserver => "SQL Server connectivity and CDC configuration",
            SuiteKind::Kafka => "Kafka broker, CDC topic and produce/consume round trip",
            SuiteKind::Opensearch => "OpenSearch cluster health and the profiles index",
            SuiteKind::Debezium => "Kafka Connect REST API and Debezium connector state",
            SuiteKind::Api => "Search API endpoints",
            SuiteKind::Monitoring => "Prometheus scraping and Grafana health",
            SuiteKind::Pipeline => "INSERT -> CDC -> Kafka -> OpenSearch -> API end to end",
        }
    }

    /// Parse a suite name. Returns `None` for anything outside the fixed set.
    pub fn parse(name: &str) -> Option<SuiteKind> {
        SuiteKind::all()
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl std::fmt::Display for SuiteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An ordered list of checks for one subsystem.
///
/// Checks run strictly in declared order and a FAIL does not stop the suite,
/// so one broken dependency does not hide the state of its siblings.
pub struct Suite {
    kind: SuiteKind,
    checks: Vec<Check>,
}

impl Suite {
    pub fn new(kind: SuiteKind) -> Self {
        Self {
            kind,
            checks: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn kind(&self) -> SuiteKind {
        self.kind
    }

    pub fn check_names(&self) -> Vec<&str> {
        self.checks.iter().map(Check::name).collect()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every check in order, streaming each result into `sink`.
    pub async fn run(&self, sink: &mut dyn ResultSink) {
        async {
            emit_suite_started(self.kind, self.checks.len());
            sink.begin_suite(self.kind);

            let mut failed = 0usize;
            for check in &self.checks {
                let result = check.run().await;
                if result.verdict == Verdict::Fail {
                    failed += 1;
                }
                sink.record(result);
            }

            emit_suite_finished(self.kind, self.checks.len(), failed);
        }
        .instrument(suite_span(self.kind))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_names() {
        assert_eq!(SuiteKind::parse("kafka"), Some(SuiteKind::Kafka));
        assert_eq!(SuiteKind::parse(" OpenSearch "), Some(SuiteKind::Opensearch));
        assert_eq!(SuiteKind::parse("pipeline"), Some(SuiteKind::Pipeline));
        assert_eq!(SuiteKind::parse("redis"), None);
    }

    #[test]
    fn all_ends_with_pipeline() {
        let all = SuiteKind::all();
        assert_eq!(all.len(), 7);
        assert_eq!(all.last(), Some(&SuiteKind::Pipeline));
    }

    #[test]
    fn names_round_trip() {
        for kind in SuiteKind::all() {
            assert_eq!(SuiteKind::parse(kind.name()), Some(kind));
        }
    }
}
