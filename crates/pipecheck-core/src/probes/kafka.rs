//! Broker probes over `rdkafka`.
//!
//! librdkafka's metadata, watermark and consumer calls block the calling
//! thread, so they run under `spawn_blocking`. Producer and admin calls are
//! already futures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tracing::debug;

use crate::config::KafkaConfig;
use crate::error::ProbeError;
use crate::outcome::Outcome;
use crate::probe::Probe;

/// Returns a description of the matching event, or `None`.
pub type EventMatcher = Arc<dyn Fn(&[u8]) -> Option<String> + Send + Sync>;

/// Match a Debezium change event whose row image has `field == value`.
///
/// Accepts both the schema envelope (`{"schema":..,"payload":{"after":..}}`)
/// and unwrapped events (`{"after":..}`). Returns `op=<code>` on a match.
pub fn match_change_event(payload: &[u8], field: &str, value: &str) -> Option<String> {
    let event: serde_json::Value = serde_json::from_slice(payload).ok()?;
    let body = match event.get("payload") {
        Some(inner) if inner.is_object() => inner,
        _ => &event,
    };
    let after = body.get("after")?;
    if after.get(field)?.as_str()? != value {
        return None;
    }
    let op = body.get("op").and_then(|op| op.as_str()).unwrap_or("?");
    Some(format!("op={op}"))
}

/// Broker connection shared by every Kafka probe.
#[derive(Debug, Clone)]
pub struct KafkaClient {
    bootstrap: String,
    timeout: Duration,
    tail_window: i64,
}

impl KafkaClient {
    pub fn new(config: &KafkaConfig, timeout: Duration) -> Self {
        Self {
            bootstrap: config.bootstrap_servers.clone(),
            timeout,
            tail_window: config.tail_window,
        }
    }

    pub fn bootstrap(&self) -> &str {
        &self.bootstrap
    }

    fn base_config(&self) -> ClientConfig {
        let timeout_ms = self.timeout.as_millis().to_string();
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap)
            .set("socket.timeout.ms", &timeout_ms)
            .set("message.timeout.ms", &timeout_ms);
        config
    }

    fn consumer(&self) -> Result<BaseConsumer, ProbeError> {
        self.base_config()
            .set("group.id", format!("pipecheck-{}", uuid::Uuid::new_v4()))
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "true")
            .set("allow.auto.create.topics", "false")
            .create()
            .map_err(|e| self.map_error(e))
    }

    fn map_error(&self, err: KafkaError) -> ProbeError {
        let target = format!("kafka {}", self.bootstrap);
        match err.rdkafka_error_code() {
            Some(RDKafkaErrorCode::OperationTimedOut) | Some(RDKafkaErrorCode::RequestTimedOut) => {
                ProbeError::timeout(target, self.timeout)
            }
            Some(RDKafkaErrorCode::AllBrokersDown)
            | Some(RDKafkaErrorCode::BrokerTransportFailure)
            | Some(RDKafkaErrorCode::Resolve)
            | Some(RDKafkaErrorCode::BrokerNotAvailable) => ProbeError::unreachable(target, err),
            _ => ProbeError::rejected(target, err),
        }
    }

    /// Run a blocking librdkafka call off the async workers.
    async fn blocking<T, F>(&self, f: F) -> Result<T, ProbeError>
    where
        T: Send + 'static,
        F: FnOnce(KafkaClient) -> Result<T, ProbeError> + Send + 'static,
    {
        let client = self.clone();
        tokio::task::spawn_blocking(move || f(client))
            .await
            .map_err(|e| ProbeError::malformed(format!("kafka {}", self.bootstrap), e))?
    }

    /// Broker and topic counts from cluster metadata.
    pub async fn cluster_summary(&self) -> Result<(usize, usize), ProbeError> {
        self.blocking(|client| {
            let consumer = client.consumer()?;
            let metadata = consumer
                .fetch_metadata(None, client.timeout)
                .map_err(|e| client.map_error(e))?;
            Ok((metadata.brokers().len(), metadata.topics().len()))
        })
        .await
    }

    /// Partition count of `topic`, or `None` when the broker does not know it.
    pub async fn topic_partitions(&self, topic: &str) -> Result<Option<usize>, ProbeError> {
        let topic = topic.to_string();
        self.blocking(move |client| {
            let consumer = client.consumer()?;
            let metadata = consumer
                .fetch_metadata(Some(&topic), client.timeout)
                .map_err(|e| client.map_error(e))?;
            Ok(metadata
                .topics()
                .iter()
                .find(|t| t.name() == topic && t.error().is_none())
                .map(|t| t.partitions().len())
                .filter(|count| *count > 0))
        })
        .await
    }

    /// Create a single-partition topic; an existing topic is fine.
    pub async fn ensure_topic(&self, topic: &str) -> Result<bool, ProbeError> {
        let admin: AdminClient<DefaultClientContext> = self
            .base_config()
            .create()
            .map_err(|e| self.map_error(e))?;
        let options = AdminOptions::new().operation_timeout(Some(self.timeout));
        let results = admin
            .create_topics(&[NewTopic::new(topic, 1, TopicReplication::Fixed(1))], &options)
            .await
            .map_err(|e| self.map_error(e))?;

        match results.into_iter().next() {
            Some(Ok(_)) => Ok(true),
            Some(Err((_, RDKafkaErrorCode::TopicAlreadyExists))) => Ok(false),
            Some(Err((name, code))) => Err(ProbeError::rejected(
                format!("kafka topic {name}"),
                format!("create failed: {code}"),
            )),
            None => Err(ProbeError::malformed(
                format!("kafka topic {topic}"),
                "admin returned no result",
            )),
        }
    }

    /// Produce one record; returns `(partition, offset)`.
    pub async fn produce(&self, topic: &str, key: &str, payload: &str) -> Result<(i32, i64), ProbeError> {
        let producer: FutureProducer = self
            .base_config()
            .create()
            .map_err(|e| self.map_error(e))?;
        producer
            .send(
                FutureRecord::to(topic).key(key).payload(payload),
                Timeout::After(self.timeout),
            )
            .await
            .map_err(|(err, _)| self.map_error(err))
    }

    /// Scan the last `tail_window` records of every partition of `topic` and
    /// return the first description `matcher` yields.
    ///
    /// `Ok(None)` covers both "no match" and "topic does not exist yet".
    pub async fn scan_tail(&self, topic: &str, matcher: EventMatcher) -> Result<Option<String>, ProbeError> {
        let topic = topic.to_string();
        self.blocking(move |client| client.scan_tail_blocking(&topic, matcher.as_ref()))
            .await
    }

    fn scan_tail_blocking(
        &self,
        topic: &str,
        matcher: &(dyn Fn(&[u8]) -> Option<String> + Send + Sync),
    ) -> Result<Option<String>, ProbeError> {
        let consumer = self.consumer()?;
        let metadata = consumer
            .fetch_metadata(Some(topic), self.timeout)
            .map_err(|e| self.map_error(e))?;
        let Some(topic_meta) = metadata
            .topics()
            .iter()
            .find(|t| t.name() == topic && t.error().is_none())
        else {
            return Ok(None);
        };

        // Stop at the high watermark seen now; later records are picked up by
        // the next attempt.
        let mut assignment = TopicPartitionList::new();
        let mut pending: HashMap<i32, i64> = HashMap::new();
        for partition in topic_meta.partitions() {
            let id = partition.id();
            let (low, high) = consumer
                .fetch_watermarks(topic, id, self.timeout)
                .map_err(|e| self.map_error(e))?;
            if high <= low {
                continue;
            }
            let start = low.max(high - self.tail_window);
            assignment
                .add_partition_offset(topic, id, Offset::Offset(start))
                .map_err(|e| self.map_error(e))?;
            pending.insert(id, high);
        }
        if pending.is_empty() {
            return Ok(None);
        }
        consumer.assign(&assignment).map_err(|e| self.map_error(e))?;

        let deadline = Instant::now() + self.timeout;
        let mut scanned = 0usize;
        while !pending.is_empty() && Instant::now() < deadline {
            match consumer.poll(Duration::from_millis(200)) {
                None => continue,
                Some(Err(KafkaError::PartitionEOF(partition))) => {
                    pending.remove(&partition);
                }
                Some(Err(err)) => return Err(self.map_error(err)),
                Some(Ok(message)) => {
                    scanned += 1;
                    if let Some(found) = message.payload().and_then(|p| matcher(p)) {
                        return Ok(Some(format!(
                            "{found} at partition {} offset {}",
                            message.partition(),
                            message.offset()
                        )));
                    }
                    let done = pending
                        .get(&message.partition())
                        .is_some_and(|high| message.offset() + 1 >= *high);
                    if done {
                        pending.remove(&message.partition());
                    }
                }
            }
        }

        debug!(topic, scanned, "tail scan found no match");
        Ok(None)
    }

    /// State of a consumer group, or `None` when the broker does not know it.
    pub async fn group_state(&self, group: &str) -> Result<Option<(String, usize)>, ProbeError> {
        let group = group.to_string();
        self.blocking(move |client| {
            let consumer = client.consumer()?;
            let list = consumer
                .fetch_group_list(Some(&group), client.timeout)
                .map_err(|e| client.map_error(e))?;
            Ok(list
                .groups()
                .iter()
                .find(|g| g.name() == group)
                .map(|g| (g.state().to_string(), g.members().len())))
        })
        .await
    }
}

/// What a [`KafkaProbe`] asks the broker.
#[derive(Clone)]
pub enum KafkaOp {
    /// Cluster metadata is readable.
    Metadata,
    /// The topic exists with at least one partition.
    TopicExists(String),
    /// The topic exists after a create-if-missing.
    EnsureTopic(String),
    /// A record can be produced.
    Produce {
        topic: String,
        key: String,
        payload: String,
    },
    /// A record matching the matcher is in the topic tail.
    FindEvent { topic: String, matcher: EventMatcher },
    /// The consumer group is `Stable`.
    GroupStable(String),
}

/// One broker operation as a probe.
pub struct KafkaProbe {
    client: KafkaClient,
    op: KafkaOp,
}

impl KafkaProbe {
    pub fn new(client: &KafkaClient, op: KafkaOp) -> Self {
        Self {
            client: client.clone(),
            op,
        }
    }
}

#[async_trait]
impl Probe for KafkaProbe {
    fn target(&self) -> String {
        let subject = match &self.op {
            KafkaOp::Metadata => "metadata".to_string(),
            KafkaOp::TopicExists(topic) | KafkaOp::EnsureTopic(topic) => format!("topic {topic}"),
            KafkaOp::Produce { topic, .. } => format!("produce to {topic}"),
            KafkaOp::FindEvent { topic, .. } => format!("scan {topic}"),
            KafkaOp::GroupStable(group) => format!("group {group}"),
        };
        format!("kafka {} ({subject})", self.client.bootstrap())
    }

    async fn observe(&self) -> Outcome {
        let result = match &self.op {
            KafkaOp::Metadata => self.client.cluster_summary().await.map(|(brokers, topics)| {
                Outcome::success(format!("{brokers} broker(s), {topics} topic(s)"))
            }),
            KafkaOp::TopicExists(topic) => {
                self.client
                    .topic_partitions(topic)
                    .await
                    .map(|partitions| match partitions {
                        Some(n) => Outcome::success(format!("{topic}: {n} partition(s)")),
                        None => Outcome::Absent,
                    })
            }
            KafkaOp::EnsureTopic(topic) => self.client.ensure_topic(topic).await.map(|created| {
                if created {
                    Outcome::success(format!("created {topic}"))
                } else {
                    Outcome::success(format!("{topic} already exists"))
                }
            }),
            KafkaOp::Produce {
                topic,
                key,
                payload,
            } => self
                .client
                .produce(topic, key, payload)
                .await
                .map(|(partition, offset)| {
                    Outcome::success(format!("produced to partition {partition} at offset {offset}"))
                }),
            KafkaOp::FindEvent { topic, matcher } => self
                .client
                .scan_tail(topic, matcher.clone())
                .await
                .map(|found| match found {
                    Some(detail) => Outcome::success(format!("consumed {detail}")),
                    None => Outcome::Absent,
                }),
            KafkaOp::GroupStable(group) => self.client.group_state(group).await.map(|state| {
                classify_group_state(group, state.as_ref().map(|(s, n)| (s.as_str(), *n)))
            }),
        };
        result.unwrap_or_else(Outcome::Error)
    }
}

/// `Stable` passes; any other state or an unknown group is not there yet.
pub fn classify_group_state(group: &str, state: Option<(&str, usize)>) -> Outcome {
    match state {
        Some(("Stable", members)) => {
            Outcome::success(format!("{group}: Stable with {members} member(s)"))
        }
        _ => Outcome::Absent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVELOPED: &str = r#"{
        "schema": {"type": "struct"},
        "payload": {
            "before": null,
            "after": {"id": 7, "email": "e2e-1@pipecheck.test", "name": "Pipecheck E2E 1"},
            "op": "c"
        }
    }"#;

    #[test]
    fn matches_enveloped_event() {
        assert_eq!(
            match_change_event(ENVELOPED.as_bytes(), "email", "e2e-1@pipecheck.test"),
            Some("op=c".to_string())
        );
    }

    #[test]
    fn matches_unwrapped_event() {
        let raw = r#"{"before":null,"after":{"email":"a@b"},"op":"u"}"#;
        assert_eq!(
            match_change_event(raw.as_bytes(), "email", "a@b"),
            Some("op=u".to_string())
        );
    }

    #[test]
    fn ignores_other_rows_and_deletes() {
        assert_eq!(
            match_change_event(ENVELOPED.as_bytes(), "email", "someone@else"),
            None
        );
        let delete = r#"{"payload":{"before":{"email":"a@b"},"after":null,"op":"d"}}"#;
        assert_eq!(match_change_event(delete.as_bytes(), "email", "a@b"), None);
        assert_eq!(match_change_event(b"not json", "email", "a@b"), None);
    }

    #[test]
    fn group_state_classification() {
        assert!(classify_group_state("indexer", Some(("Stable", 2))).is_success());
        assert_eq!(
            classify_group_state("indexer", Some(("PreparingRebalance", 1))),
            Outcome::Absent
        );
        assert_eq!(classify_group_state("indexer", None), Outcome::Absent);
    }
}
