//! Harness configuration: endpoints, resource names, timeouts, retry budgets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::outcome::Verdict;
use crate::poller::RetryPolicy;
use crate::scenario::StagePolicies;

/// Source database connection and change-capture names.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub database: String,
    /// Schema-qualified source table, e.g. `dbo.profiles`.
    pub source_table: String,
    /// CDC capture instance; the change table is `cdc.<instance>_CT`.
    pub capture_instance: String,
    /// Accept the server certificate without validation (local deployments).
    pub trust_cert: bool,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1433,
            user: "sa".to_string(),
            password: "YourStrong!Passw0rd".to_string(),
            database: "appdb".to_string(),
            source_table: "dbo.profiles".to_string(),
            capture_instance: "dbo_profiles".to_string(),
            trust_cert: true,
        }
    }
}

impl std::fmt::Debug for SqlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("source_table", &self.source_table)
            .field("capture_instance", &self.capture_instance)
            .field("trust_cert", &self.trust_cert)
            .finish()
    }
}

impl SqlConfig {
    /// `cdc.<instance>_CT`
    pub fn change_table(&self) -> String {
        format!("cdc.{}_CT", self.capture_instance)
    }
}

/// Broker connection and topic names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    /// Topic Debezium publishes source-table changes to.
    pub cdc_topic: String,
    /// Scratch topic used by the produce/consume check.
    pub probe_topic: String,
    /// Consumer group of the search indexer.
    pub indexer_group: String,
    /// How many trailing messages per partition a topic scan reads.
    pub tail_window: i64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            cdc_topic: "cdc.dbo.profiles".to_string(),
            probe_topic: "pipecheck.probe".to_string(),
            indexer_group: "opensearch-indexer".to_string(),
            tail_window: 500,
        }
    }
}

/// HTTP endpoints of the search side and monitoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub opensearch_url: String,
    pub index: String,
    pub connect_url: String,
    pub connector: String,
    pub api_url: String,
    pub prometheus_url: String,
    /// Prometheus scrape job that targets the search API.
    pub prometheus_job: String,
    pub grafana_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            opensearch_url: "http://localhost:9200".to_string(),
            index: "profiles".to_string(),
            connect_url: "http://localhost:8083".to_string(),
            connector: "profiles-connector".to_string(),
            api_url: "http://localhost:8000".to_string(),
            prometheus_url: "http://localhost:9090".to_string(),
            prometheus_job: "search-api".to_string(),
            grafana_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Everything a harness run needs to know about the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub sql: SqlConfig,
    pub kafka: KafkaConfig,
    pub endpoints: EndpointConfig,
    /// Per-request timeout for every external call.
    #[serde(with = "duration_ms")]
    pub probe_timeout: Duration,
    /// Verdict for a yellow search cluster (single-node deployments are
    /// yellow by nature).
    pub yellow_health: Verdict,
    /// Default retry budget for suite checks.
    pub suite_policy: RetryPolicy,
    pub stages: StagePolicies,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let probe_timeout = Duration::from_secs(5);
        let policy = |attempts: u32, delay_secs: u64| {
            RetryPolicy::new(attempts, Duration::from_secs(delay_secs))
                .unwrap_or_else(|_| RetryPolicy::once())
                .with_attempt_timeout(probe_timeout * 2)
        };

        Self {
            sql: SqlConfig::default(),
            kafka: KafkaConfig::default(),
            endpoints: EndpointConfig::default(),
            probe_timeout,
            yellow_health: Verdict::Warn,
            suite_policy: policy(3, 2),
            stages: StagePolicies {
                insert: policy(1, 0),
                capture: policy(6, 2),
                publish: policy(6, 2),
                index: policy(10, 3),
                query: policy(5, 2),
            },
        }
    }
}

impl HarnessConfig {
    /// Change the per-request timeout. Every retry policy's attempt bound is
    /// kept at twice the request timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        let attempt = timeout.saturating_mul(2);
        self.probe_timeout = timeout;
        self.suite_policy = self.suite_policy.with_attempt_timeout(attempt);
        let stages = &mut self.stages;
        for policy in [
            &mut stages.insert,
            &mut stages.capture,
            &mut stages.publish,
            &mut stages.index,
            &mut stages.query,
        ] {
            *policy = policy.with_attempt_timeout(attempt);
        }
        self
    }

    /// Reject values that would make statements unsafe or runs meaningless.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.sql.source_table)?;
        validate_identifier(&self.sql.capture_instance)?;

        if self.probe_timeout.is_zero() {
            return Err(HarnessError::InvalidConfig(
                "probe timeout must be greater than zero".to_string(),
            ));
        }
        if self.kafka.tail_window <= 0 {
            return Err(HarnessError::InvalidConfig(format!(
                "kafka tail window must be positive (got {})",
                self.kafka.tail_window
            )));
        }
        for (name, url) in [
            ("opensearch", &self.endpoints.opensearch_url),
            ("connect", &self.endpoints.connect_url),
            ("api", &self.endpoints.api_url),
            ("prometheus", &self.endpoints.prometheus_url),
            ("grafana", &self.endpoints.grafana_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(HarnessError::InvalidConfig(format!(
                    "{name} URL must start with http:// or https:// (got {url:?})"
                )));
            }
        }
        Ok(())
    }
}

/// Identifiers cannot be bound as parameters, so only a conservative
/// character set is interpolated into SQL text.
pub fn validate_identifier(ident: &str) -> Result<()> {
    let valid = !ident.is_empty()
        && !ident.starts_with('.')
        && !ident.ends_with('.')
        && ident
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(HarnessError::InvalidIdentifier(ident.to_string()))
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        HarnessConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn downstream_stages_get_more_patience() {
        let stages = HarnessConfig::default().stages;
        assert_eq!(stages.insert.max_attempts(), 1);
        assert_eq!(stages.capture.max_attempts(), 6);
        assert_eq!(stages.capture.delay(), Duration::from_secs(2));
        assert!(stages.index.max_attempts() > stages.query.max_attempts());
        assert!(stages.index.delay() > stages.insert.delay());
    }

    #[test]
    fn debug_output_hides_password() {
        let rendered = format!("{:?}", SqlConfig::default());
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("Passw0rd"));
    }

    #[test]
    fn identifiers_are_restricted() {
        assert!(validate_identifier("dbo.profiles").is_ok());
        assert!(validate_identifier("dbo_profiles").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("dbo.profiles; DROP TABLE x").is_err());
        assert!(validate_identifier("[dbo].[profiles]").is_err());
        assert!(validate_identifier(".profiles").is_err());
    }

    #[test]
    fn bad_url_rejected() {
        let mut config = HarnessConfig::default();
        config.endpoints.api_url = "localhost:8000".to_string();
        let err = config.validate().expect_err("missing scheme");
        assert!(err.to_string().contains("api URL"));
    }

    #[test]
    fn probe_timeout_moves_attempt_bounds() {
        let config = HarnessConfig::default().with_probe_timeout(Duration::from_secs(20));
        assert_eq!(config.probe_timeout, Duration::from_secs(20));
        assert_eq!(config.suite_policy.attempt_timeout(), Duration::from_secs(40));
        assert_eq!(config.stages.index.attempt_timeout(), Duration::from_secs(40));
        assert_eq!(config.stages.index.max_attempts(), 10);
    }

    #[test]
    fn huge_probe_timeout_saturates() {
        let config = HarnessConfig::default().with_probe_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(config.probe_timeout, Duration::from_secs(u64::MAX));
        assert_eq!(config.suite_policy.attempt_timeout(), Duration::MAX);
        assert_eq!(config.stages.capture.attempt_timeout(), Duration::MAX);
    }

    #[test]
    fn change_table_name() {
        assert_eq!(SqlConfig::default().change_table(), "cdc.dbo_profiles_CT");
    }

    #[test]
    fn serialization_omits_password() {
        let value = serde_json::to_value(HarnessConfig::default()).expect("serialize");
        assert!(value["sql"].get("password").is_none());
        assert_eq!(value["probe_timeout"], 5000);
        assert_eq!(value["yellow_health"], "warn");
    }
}
