//! The search API surface.

use serde::Deserialize;

use crate::check::{Check, Interpretation};
use crate::live::{ApiSearchResponse, LiveContext};
use crate::outcome::Outcome;
use crate::probes::{expect_body_contains, expect_found, expect_json, expect_status, HttpProbe};
use crate::suite::{Suite, SuiteKind};

/// Counter the API increments on every search.
const SEARCH_COUNTER: &str = "search_requests_total";

#[derive(Debug, Deserialize)]
pub(crate) struct ServiceInfo {
    pub service: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HealthReply {
    pub status: String,
    #[serde(default)]
    pub cluster_status: Option<String>,
}

pub(crate) fn classify_root(_target: &str, info: ServiceInfo) -> Outcome {
    match info.version {
        Some(version) => Outcome::success(format!("{} {}", info.service, version)),
        None => Outcome::success(info.service),
    }
}

pub(crate) fn classify_health(_target: &str, health: HealthReply) -> Outcome {
    if health.status != "ok" {
        return Outcome::Absent;
    }
    match health.cluster_status {
        Some(cluster) => Outcome::success(format!("status ok, cluster {cluster}")),
        None => Outcome::success("status ok"),
    }
}

fn classify_search(_target: &str, body: ApiSearchResponse) -> Outcome {
    Outcome::success(format!("total {}", body.total))
}

pub fn suite(ctx: &LiveContext) -> Suite {
    let policy = ctx.config.suite_policy;

    // Malformed base URLs are rejected by config validation.
    let search = ctx
        .api_search(Some("test"))
        .unwrap_or_else(|_| ctx.api("search?q=test"));
    let search_without_query = ctx.api_search(None).unwrap_or_else(|_| ctx.api("search"));

    Suite::new(SuiteKind::Api)
        .with_check(Check::new(
            "API root advertises the service",
            HttpProbe::get(&ctx.http, ctx.api("/"), expect_json(classify_root)),
            policy,
            Interpretation::required("API root unavailable"),
        ))
        .with_check(Check::new(
            "API /health reports ok",
            HttpProbe::get(&ctx.http, ctx.api("health"), expect_json(classify_health)),
            policy,
            Interpretation::required("API health is not ok"),
        ))
        .with_check(Check::new(
            "API /search returns results",
            HttpProbe::get(&ctx.http, search, expect_json(classify_search)),
            policy,
            Interpretation::required("API search failed"),
        ))
        .with_check(Check::new(
            "API /search rejects a missing query",
            HttpProbe::get(&ctx.http, search_without_query, expect_status(422)),
            policy,
            Interpretation::required("API search without q was not rejected with 422"),
        ))
        .with_check(Check::new(
            format!("API /metrics exposes {SEARCH_COUNTER}"),
            HttpProbe::get(&ctx.http, ctx.api("metrics"), expect_body_contains(SEARCH_COUNTER)),
            policy,
            Interpretation::advisory(
                format!("{SEARCH_COUNTER} not exposed yet"),
                "API metrics unavailable",
            ),
        ))
        .with_check(Check::new(
            "API /docs served",
            HttpProbe::get(&ctx.http, ctx.api("docs"), expect_found()),
            policy,
            Interpretation::advisory("API docs not served", "API docs unavailable"),
        ))
}
