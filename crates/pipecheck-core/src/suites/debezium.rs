//! Kafka Connect REST API and the Debezium connector.

use serde::Deserialize;

use crate::check::{Check, Interpretation};
use crate::error::ProbeError;
use crate::live::LiveContext;
use crate::outcome::Outcome;
use crate::probes::{classifier, expect_json, Classifier, HttpProbe};
use crate::suite::{Suite, SuiteKind};

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectInfo {
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectorStatus {
    pub connector: WorkerState,
    #[serde(default)]
    pub tasks: Vec<TaskState>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkerState {
    pub state: String,
    #[serde(default)]
    pub trace: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskState {
    pub id: u32,
    pub state: String,
    #[serde(default)]
    pub trace: Option<String>,
}

fn trace_head(trace: Option<&str>) -> &str {
    trace
        .and_then(|t| t.lines().next())
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .unwrap_or("no trace")
}

pub(crate) fn classify_connectors(name: &str, connectors: &[String]) -> Outcome {
    if connectors.iter().any(|c| c == name) {
        Outcome::success(format!("{name} registered"))
    } else {
        Outcome::Absent
    }
}

/// RUNNING passes, FAILED is definitive, anything else may still settle.
pub(crate) fn classify_connector(target: &str, status: &ConnectorStatus) -> Outcome {
    match status.connector.state.as_str() {
        "RUNNING" => Outcome::success("connector RUNNING"),
        "FAILED" => Outcome::Error(ProbeError::assertion(
            target,
            format!(
                "connector FAILED: {}",
                trace_head(status.connector.trace.as_deref())
            ),
        )),
        _ => Outcome::Absent,
    }
}

/// Every task RUNNING passes; no tasks yet is retried; any FAILED task is
/// definitive.
pub(crate) fn classify_tasks(target: &str, status: &ConnectorStatus) -> Outcome {
    if let Some(failed) = status.tasks.iter().find(|t| t.state == "FAILED") {
        return Outcome::Error(ProbeError::assertion(
            target,
            format!(
                "task {} FAILED: {}",
                failed.id,
                trace_head(failed.trace.as_deref())
            ),
        ));
    }
    if status.tasks.is_empty() || status.tasks.iter().any(|t| t.state != "RUNNING") {
        return Outcome::Absent;
    }
    Outcome::success(format!("{} task(s) RUNNING", status.tasks.len()))
}

/// A status reply; 404 means the connector is not registered yet.
fn status_classifier(judge: fn(&str, &ConnectorStatus) -> Outcome) -> Classifier {
    classifier(move |target, reply| {
        if reply.status == 404 {
            return Outcome::Absent;
        }
        if let Err(err) = reply.ensure_success(target) {
            return Outcome::Error(err);
        }
        match reply.json::<ConnectorStatus>(target) {
            Ok(status) => judge(target, &status),
            Err(err) => Outcome::Error(err),
        }
    })
}

pub fn suite(ctx: &LiveContext) -> Suite {
    let policy = ctx.config.suite_policy;
    let name = ctx.config.endpoints.connector.clone();
    let status_url = ctx.connect(&format!("connectors/{name}/status"));

    let registered = {
        let name = name.clone();
        expect_json(move |_, connectors: Vec<String>| classify_connectors(&name, &connectors))
    };

    Suite::new(SuiteKind::Debezium)
        .with_check(Check::new(
            "Kafka Connect REST API reachable",
            HttpProbe::get(
                &ctx.http,
                ctx.connect("/"),
                expect_json(|_, info: ConnectInfo| {
                    Outcome::success(format!("Kafka Connect {}", info.version))
                }),
            ),
            policy,
            Interpretation::required("Kafka Connect REST API unavailable"),
        ))
        .with_check(Check::new(
            format!("Connector {name} registered"),
            HttpProbe::get(&ctx.http, ctx.connect("connectors"), registered),
            policy,
            Interpretation::required(format!("connector {name} is not registered")),
        ))
        .with_check(Check::new(
            format!("Connector {name} RUNNING"),
            HttpProbe::get(&ctx.http, status_url.clone(), status_classifier(classify_connector)),
            policy,
            Interpretation::required(format!("connector {name} is not RUNNING")),
        ))
        .with_check(Check::new(
            format!("Connector {name} tasks RUNNING"),
            HttpProbe::get(&ctx.http, status_url, status_classifier(classify_tasks)),
            policy,
            Interpretation::required(format!("connector {name} tasks are not all RUNNING")),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(json: &str) -> ConnectorStatus {
        serde_json::from_str(json).expect("status json")
    }

    #[test]
    fn registered_connector() {
        let list = vec!["other".to_string(), "profiles-connector".to_string()];
        assert!(classify_connectors("profiles-connector", &list).is_success());
        assert_eq!(classify_connectors("missing", &list), Outcome::Absent);
    }

    #[test]
    fn failed_connector_carries_trace_head() {
        let s = status(
            r#"{"name":"c","connector":{"state":"FAILED","trace":"org.apache.kafka.connect.errors.ConnectException: login failed\n\tat io.debezium..."},"tasks":[]}"#,
        );
        match classify_connector("GET status", &s) {
            Outcome::Error(ProbeError::Assertion { reason, .. }) => {
                assert_eq!(
                    reason,
                    "connector FAILED: org.apache.kafka.connect.errors.ConnectException: login failed"
                );
            }
            other => panic!("expected assertion, got {other:?}"),
        }
    }

    #[test]
    fn paused_connector_is_retried() {
        let s = status(r#"{"connector":{"state":"PAUSED"},"tasks":[]}"#);
        assert_eq!(classify_connector("t", &s), Outcome::Absent);
        let s = status(r#"{"connector":{"state":"RUNNING"},"tasks":[]}"#);
        assert!(classify_connector("t", &s).is_success());
    }

    #[test]
    fn task_states() {
        let none = status(r#"{"connector":{"state":"RUNNING"},"tasks":[]}"#);
        assert_eq!(classify_tasks("t", &none), Outcome::Absent);

        let running = status(
            r#"{"connector":{"state":"RUNNING"},"tasks":[{"id":0,"state":"RUNNING"},{"id":1,"state":"RUNNING"}]}"#,
        );
        assert_eq!(
            classify_tasks("t", &running),
            Outcome::success("2 task(s) RUNNING")
        );

        let failed = status(
            r#"{"connector":{"state":"RUNNING"},"tasks":[{"id":0,"state":"RUNNING"},{"id":1,"state":"FAILED","trace":"boom"}]}"#,
        );
        let outcome = classify_tasks("t", &failed);
        assert!(!outcome.is_retryable());
        assert!(matches!(
            outcome,
            Outcome::Error(ProbeError::Assertion { ref reason, .. }) if reason == "task 1 FAILED: boom"
        ));
    }
}
