//! Search cluster health and the target index.

use serde::Deserialize;
use serde_json::json;

use crate::check::{Check, Interpretation};
use crate::error::ProbeError;
use crate::live::LiveContext;
use crate::outcome::Outcome;
use crate::probes::{expect_found, expect_json, HttpProbe};
use crate::suite::{Suite, SuiteKind};

#[derive(Debug, Deserialize)]
pub(crate) struct ClusterHealth {
    pub status: String,
    #[serde(default)]
    pub number_of_nodes: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub hits: SearchHits,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHits {
    #[serde(default)]
    pub total: Option<HitTotal>,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HitTotal {
    pub value: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchHit {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
}

/// green passes, yellow is Absent (verdict configurable), red is definitive.
pub(crate) fn classify_health(target: &str, health: ClusterHealth) -> Outcome {
    let nodes = health
        .number_of_nodes
        .map(|n| format!(", {n} node(s)"))
        .unwrap_or_default();
    match health.status.as_str() {
        "green" => Outcome::success(format!("status green{nodes}")),
        "yellow" => Outcome::Absent,
        "red" => Outcome::Error(ProbeError::assertion(target, "cluster status is red")),
        other => Outcome::Error(ProbeError::malformed(
            target,
            format!("unknown cluster status {other:?}"),
        )),
    }
}

pub(crate) fn classify_count(_target: &str, body: CountResponse) -> Outcome {
    if body.count > 0 {
        Outcome::success(format!("{} document(s)", body.count))
    } else {
        Outcome::Absent
    }
}

pub(crate) fn classify_search(_target: &str, body: SearchResponse) -> Outcome {
    let total = body
        .hits
        .total
        .map(|t| t.value)
        .unwrap_or(body.hits.hits.len() as u64);
    Outcome::success(format!("search executed, total {total}"))
}

pub fn suite(ctx: &LiveContext) -> Suite {
    let policy = ctx.config.suite_policy;
    let index = &ctx.config.endpoints.index;

    Suite::new(SuiteKind::Opensearch)
        .with_check(Check::new(
            "OpenSearch cluster health",
            HttpProbe::get(&ctx.http, ctx.opensearch("_cluster/health"), expect_json(classify_health)),
            policy,
            Interpretation::required("cluster health unavailable")
                .absent_as(ctx.config.yellow_health, "cluster status is yellow"),
        ))
        .with_check(Check::new(
            format!("Index {index} exists"),
            HttpProbe::head(&ctx.http, ctx.opensearch(index), expect_found()),
            policy,
            Interpretation::required(format!("index {index} does not exist")),
        ))
        .with_check(Check::new(
            format!("Index {index} has documents"),
            HttpProbe::get(
                &ctx.http,
                ctx.opensearch(&format!("{index}/_count")),
                expect_json(classify_count),
            ),
            policy,
            Interpretation::advisory(
                format!("index {index} is empty"),
                "document count unavailable",
            ),
        ))
        .with_check(Check::new(
            "Search query executes",
            HttpProbe::post_json(
                &ctx.http,
                ctx.opensearch(&format!("{index}/_search")),
                json!({ "size": 0, "query": { "match_all": {} } }),
                expect_json(classify_search),
            ),
            policy,
            Interpretation::required(format!("search against {index} failed")),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::outcome::Verdict;

    fn health(status: &str) -> ClusterHealth {
        ClusterHealth {
            status: status.to_string(),
            number_of_nodes: Some(1),
        }
    }

    #[test]
    fn health_colours() {
        assert_eq!(
            classify_health("h", health("green")),
            Outcome::success("status green, 1 node(s)")
        );
        assert_eq!(classify_health("h", health("yellow")), Outcome::Absent);

        let red = classify_health("h", health("red"));
        assert!(matches!(red, Outcome::Error(ProbeError::Assertion { .. })));
        assert!(!red.is_retryable());
    }

    #[test]
    fn yellow_verdict_follows_config() {
        let mut config = HarnessConfig::default();
        let rules = Interpretation::required("cluster health unavailable")
            .absent_as(config.yellow_health, "cluster status is yellow");
        assert_eq!(rules.classify(&Outcome::Absent, 3).0, Verdict::Warn);

        config.yellow_health = Verdict::Pass;
        let rules = Interpretation::required("cluster health unavailable")
            .absent_as(config.yellow_health, "cluster status is yellow");
        assert_eq!(rules.classify(&Outcome::Absent, 3).0, Verdict::Pass);
    }

    #[test]
    fn empty_index_is_absent() {
        assert_eq!(classify_count("c", CountResponse { count: 0 }), Outcome::Absent);
        assert!(classify_count("c", CountResponse { count: 9 }).is_success());
    }

    #[test]
    fn search_total_from_hits() {
        let body: SearchResponse =
            serde_json::from_str(r#"{"hits":{"total":{"value":12,"relation":"eq"},"hits":[]}}"#)
                .expect("decode");
        assert_eq!(
            classify_search("s", body),
            Outcome::success("search executed, total 12")
        );
    }

    #[test]
    fn suite_layout() {
        let ctx = LiveContext::new(HarnessConfig::default()).expect("context");
        let suite = suite(&ctx);
        assert_eq!(
            suite.check_names(),
            vec![
                "OpenSearch cluster health",
                "Index profiles exists",
                "Index profiles has documents",
                "Search query executes",
            ]
        );
    }
}
