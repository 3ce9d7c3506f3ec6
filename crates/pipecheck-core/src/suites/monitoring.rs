//! Prometheus scraping and Grafana health.

use serde::Deserialize;

use crate::check::{Check, Interpretation};
use crate::live::LiveContext;
use crate::outcome::Outcome;
use crate::probes::{expect_json, expect_ok, HttpProbe};
use crate::suite::{Suite, SuiteKind};

#[derive(Debug, Deserialize)]
pub(crate) struct TargetsReply {
    pub data: TargetsData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TargetsData {
    #[serde(rename = "activeTargets", default)]
    pub active_targets: Vec<ActiveTarget>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActiveTarget {
    #[serde(default)]
    pub labels: std::collections::HashMap<String, String>,
    pub health: String,
    #[serde(rename = "lastError", default)]
    pub last_error: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GrafanaHealth {
    pub database: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// At least one target of `job` is up. Targets that exist but are down are
/// retried; the scrape may simply not have happened yet.
pub(crate) fn classify_targets(job: &str, reply: &TargetsReply) -> Outcome {
    let targets: Vec<&ActiveTarget> = reply
        .data
        .active_targets
        .iter()
        .filter(|t| t.labels.get("job").map(String::as_str) == Some(job))
        .collect();

    let up = targets.iter().filter(|t| t.health == "up").count();
    if up > 0 {
        return Outcome::success(format!("{up}/{} target(s) of job {job} up", targets.len()));
    }
    if let Some(down) = targets.iter().find(|t| !t.last_error.is_empty()) {
        tracing::debug!(job, error = %down.last_error, "prometheus target not up");
    }
    Outcome::Absent
}

pub(crate) fn classify_grafana(_target: &str, health: GrafanaHealth) -> Outcome {
    if health.database != "ok" {
        return Outcome::Absent;
    }
    match health.version {
        Some(version) => Outcome::success(format!("database ok, Grafana {version}")),
        None => Outcome::success("database ok"),
    }
}

pub fn suite(ctx: &LiveContext) -> Suite {
    let policy = ctx.config.suite_policy;
    let job = ctx.config.endpoints.prometheus_job.clone();

    let targets = {
        let job = job.clone();
        expect_json(move |_, reply: TargetsReply| classify_targets(&job, &reply))
    };

    Suite::new(SuiteKind::Monitoring)
        .with_check(Check::new(
            "Prometheus healthy",
            HttpProbe::get(&ctx.http, ctx.prometheus("-/healthy"), expect_ok()),
            policy,
            Interpretation::required("Prometheus is not healthy"),
        ))
        .with_check(Check::new(
            format!("Prometheus scrapes job {job}"),
            HttpProbe::get(&ctx.http, ctx.prometheus("api/v1/targets"), targets),
            policy,
            Interpretation::required(format!("no Prometheus target of job {job} is up")),
        ))
        .with_check(Check::new(
            "Grafana database ok",
            HttpProbe::get(&ctx.http, ctx.grafana("api/health"), expect_json(classify_grafana)),
            policy,
            Interpretation::advisory("Grafana database is not ok", "Grafana health unavailable"),
        ))
}
