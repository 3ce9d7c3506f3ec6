//! Live wiring: clients built from configuration and the pipeline backend
//! that drives a real deployment.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, ProbeError, Result};
use crate::outcome::Outcome;
use crate::probes::{
    classify_rows, join_url, match_change_event, EventMatcher, HttpClient, HttpReply,
    KafkaClient, SqlClient, SqlExpectation,
};
use crate::scenario::{PipelineBackend, Stage};
use crate::suites::opensearch::SearchResponse;
use crate::token::PipelineToken;

/// Validated configuration plus one client per external system.
#[derive(Debug, Clone)]
pub struct LiveContext {
    pub config: HarnessConfig,
    pub http: HttpClient,
    pub kafka: KafkaClient,
    pub sql: SqlClient,
}

impl LiveContext {
    /// Validate `config` and build the clients. No connection is opened here.
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let http = HttpClient::new(config.probe_timeout)
            .map_err(|e| HarnessError::InvalidConfig(e.to_string()))?;
        let kafka = KafkaClient::new(&config.kafka, config.probe_timeout);
        let sql = SqlClient::new(config.sql.clone(), config.probe_timeout);
        Ok(Self {
            config,
            http,
            kafka,
            sql,
        })
    }

    pub fn opensearch(&self, path: &str) -> String {
        join_url(&self.config.endpoints.opensearch_url, path)
    }

    pub fn connect(&self, path: &str) -> String {
        join_url(&self.config.endpoints.connect_url, path)
    }

    pub fn api(&self, path: &str) -> String {
        join_url(&self.config.endpoints.api_url, path)
    }

    pub fn prometheus(&self, path: &str) -> String {
        join_url(&self.config.endpoints.prometheus_url, path)
    }

    pub fn grafana(&self, path: &str) -> String {
        join_url(&self.config.endpoints.grafana_url, path)
    }

    /// `/search` URL with the query string encoded.
    pub fn api_search(&self, query: Option<&str>) -> std::result::Result<String, ProbeError> {
        let base = self.api("search");
        let mut url = reqwest::Url::parse(&base).map_err(|e| ProbeError::malformed(&base, e))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(q) = query {
                pairs.append_pair("q", q);
            }
            pairs.append_pair("index", &self.config.endpoints.index);
        }
        Ok(url.into())
    }
}

/// Response of the search API's `/search` endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiSearchResponse {
    pub total: u64,
    #[serde(default)]
    pub hits: Vec<ApiHit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiHit {
    #[serde(rename = "_source", default)]
    pub source: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct DeleteByQueryResponse {
    #[serde(default)]
    deleted: u64,
}

/// The injected document in a `_search` reply. 404 means the index does
/// not exist yet.
pub fn classify_index_search(target: &str, reply: &HttpReply, index: &str) -> Outcome {
    if reply.status == 404 {
        return Outcome::Absent;
    }
    if let Err(err) = reply.ensure_success(target) {
        return Outcome::Error(err);
    }
    match reply.json::<SearchResponse>(target) {
        Ok(body) => match body.hits.hits.first() {
            Some(hit) => Outcome::success(format!(
                "document _id={} indexed in {index}",
                hit.id.as_deref().unwrap_or("?")
            )),
            None => Outcome::Absent,
        },
        Err(err) => Outcome::Error(err),
    }
}

/// Success only if a hit's `_source.name` is exactly `name`.
pub fn classify_api_search(target: &str, reply: &HttpReply, name: &str) -> Outcome {
    if let Err(err) = reply.ensure_success(target) {
        return Outcome::Error(err);
    }
    match reply.json::<ApiSearchResponse>(target) {
        Ok(body) => {
            let found = body
                .hits
                .iter()
                .any(|hit| hit.source.get("name").and_then(|n| n.as_str()) == Some(name));
            if found {
                Outcome::success(format!("API returned {name:?} ({} hit(s))", body.total))
            } else {
                Outcome::Absent
            }
        }
        Err(err) => Outcome::Error(err),
    }
}

/// Pipeline stages against a real deployment.
pub struct LivePipelineBackend {
    ctx: LiveContext,
}

impl LivePipelineBackend {
    pub fn new(ctx: LiveContext) -> Self {
        Self { ctx }
    }

    fn email_query(token: &PipelineToken) -> serde_json::Value {
        json!({ "match_phrase": { "email": token.derived_email } })
    }

    async fn insert(&self, token: &PipelineToken) -> Outcome {
        let statement = format!(
            "INSERT INTO {} (name, email, bio) OUTPUT INSERTED.id VALUES (@P1, @P2, @P3)",
            self.ctx.config.sql.source_table
        );
        let params = [
            token.derived_name.clone(),
            token.derived_email.clone(),
            format!("pipeline validation row {}", token.correlation_id),
        ];
        match self.ctx.sql.query_first_column(&statement, &params).await {
            Ok(rows) => classify_rows(SqlExpectation::AnyRow, "inserted id", &rows),
            Err(err) => Outcome::Error(err),
        }
    }

    async fn captured(&self, token: &PipelineToken) -> Outcome {
        let statement = format!(
            "SELECT TOP 1 __$operation FROM {} WHERE email = @P1",
            self.ctx.config.sql.change_table()
        );
        match self
            .ctx
            .sql
            .query_first_column(&statement, &[token.derived_email.clone()])
            .await
        {
            Ok(rows) => classify_rows(SqlExpectation::AnyRow, "captured __$operation", &rows),
            Err(err) => Outcome::Error(err),
        }
    }

    async fn published(&self, token: &PipelineToken) -> Outcome {
        let email = token.derived_email.clone();
        let matcher: EventMatcher =
            Arc::new(move |payload: &[u8]| match_change_event(payload, "email", &email));
        match self
            .ctx
            .kafka
            .scan_tail(&self.ctx.config.kafka.cdc_topic, matcher)
            .await
        {
            Ok(Some(detail)) => Outcome::success(format!("CDC event {detail}")),
            Ok(None) => Outcome::Absent,
            Err(err) => Outcome::Error(err),
        }
    }

    async fn indexed(&self, token: &PipelineToken) -> Outcome {
        let index = &self.ctx.config.endpoints.index;
        let url = self.ctx.opensearch(&format!("{index}/_search"));
        let body = json!({ "size": 1, "query": Self::email_query(token) });
        match self.ctx.http.send(Method::POST, &url, Some(&body)).await {
            Ok(reply) => classify_index_search(&format!("POST {url}"), &reply, index),
            Err(err) => Outcome::Error(err),
        }
    }

    async fn queried(&self, token: &PipelineToken) -> Outcome {
        let url = match self.ctx.api_search(Some(&token.derived_name)) {
            Ok(url) => url,
            Err(err) => return Outcome::Error(err),
        };
        match self.ctx.http.send(Method::GET, &url, None).await {
            Ok(reply) => classify_api_search(&format!("GET {url}"), &reply, &token.derived_name),
            Err(err) => Outcome::Error(err),
        }
    }
}

#[async_trait]
impl PipelineBackend for LivePipelineBackend {
    fn describe(&self, stage: Stage) -> String {
        let config = &self.ctx.config;
        match stage {
            Stage::Inserted => format!("{} {}", self.ctx.sql.describe(), config.sql.source_table),
            Stage::Captured => format!("{} {}", self.ctx.sql.describe(), config.sql.change_table()),
            Stage::Published => format!(
                "kafka {} topic {}",
                config.kafka.bootstrap_servers, config.kafka.cdc_topic
            ),
            Stage::Indexed => self.ctx.opensearch(&config.endpoints.index),
            Stage::Queried => self.ctx.api("search"),
        }
    }

    async fn observe(&self, stage: Stage, token: &PipelineToken) -> Outcome {
        match stage {
            Stage::Inserted => self.insert(token).await,
            Stage::Captured => self.captured(token).await,
            Stage::Published => self.published(token).await,
            Stage::Indexed => self.indexed(token).await,
            Stage::Queried => self.queried(token).await,
        }
    }

    async fn cleanup(&self, token: &PipelineToken) -> Outcome {
        let index = &self.ctx.config.endpoints.index;
        let url = self.ctx.opensearch(&format!("{index}/_delete_by_query"));
        let body = json!({ "query": Self::email_query(token) });
        let target = format!("POST {url}");

        let reply = match self.ctx.http.send(Method::POST, &url, Some(&body)).await {
            Ok(reply) => reply,
            Err(err) => return Outcome::Error(err),
        };
        if reply.status == 404 {
            return Outcome::Absent;
        }
        if let Err(err) = reply.ensure_success(&target) {
            return Outcome::Error(err);
        }
        match reply.json::<DeleteByQueryResponse>(&target) {
            Ok(body) if body.deleted == 0 => Outcome::Absent,
            Ok(body) => Outcome::success(format!("deleted {} document(s)", body.deleted)),
            Err(err) => Outcome::Error(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> LiveContext {
        LiveContext::new(HarnessConfig::default()).expect("default config")
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = HarnessConfig::default();
        config.sql.source_table = "profiles; DROP TABLE x".to_string();
        assert!(matches!(
            LiveContext::new(config),
            Err(HarnessError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn search_url_encodes_the_name() {
        let url = ctx().api_search(Some("Pipecheck E2E 17")).expect("url");
        assert_eq!(
            url,
            "http://localhost:8000/search?q=Pipecheck+E2E+17&index=profiles"
        );
        let bare = ctx().api_search(None).expect("url");
        assert_eq!(bare, "http://localhost:8000/search?index=profiles");
    }

    #[test]
    fn index_search_classification() {
        let hit = r#"{"hits":{"total":{"value":1},"hits":[{"_id":"41","_source":{"email":"e"}}]}}"#;
        assert_eq!(
            classify_index_search("POST /profiles/_search", &HttpReply::new(200, hit), "profiles"),
            Outcome::success("document _id=41 indexed in profiles")
        );

        let empty = r#"{"hits":{"total":{"value":0},"hits":[]}}"#;
        assert_eq!(
            classify_index_search("t", &HttpReply::new(200, empty), "profiles"),
            Outcome::Absent
        );
        assert_eq!(
            classify_index_search("t", &HttpReply::new(404, "{}"), "profiles"),
            Outcome::Absent
        );
        assert!(matches!(
            classify_index_search("t", &HttpReply::new(500, ""), "profiles"),
            Outcome::Error(ProbeError::Status { status: 500, .. })
        ));
    }

    #[test]
    fn api_search_requires_exact_name() {
        let name = "Pipecheck E2E 17";
        let fuzzy = r#"{"total":1,"hits":[{"_source":{"name":"Pipecheck E2E 16"}}]}"#;
        assert_eq!(
            classify_api_search("t", &HttpReply::new(200, fuzzy), name),
            Outcome::Absent
        );

        let exact = r#"{"total":2,"hits":[
            {"_source":{"name":"Pipecheck E2E 16"}},
            {"_source":{"name":"Pipecheck E2E 17"}}
        ]}"#;
        assert_eq!(
            classify_api_search("t", &HttpReply::new(200, exact), name),
            Outcome::success("API returned \"Pipecheck E2E 17\" (2 hit(s))")
        );
    }

    #[test]
    fn describe_names_each_resource() {
        let backend = LivePipelineBackend::new(ctx());
        assert_eq!(
            backend.describe(Stage::Captured),
            "sqlserver localhost:1433/appdb cdc.dbo_profiles_CT"
        );
        assert_eq!(
            backend.describe(Stage::Published),
            "kafka localhost:9092 topic cdc.dbo.profiles"
        );
        assert_eq!(backend.describe(Stage::Queried), "http://localhost:8000/search");
    }
}
