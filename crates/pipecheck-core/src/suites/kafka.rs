//! Broker reachability, topics, produce/consume and the indexer group.

use std::sync::Arc;

use serde_json::json;

use crate::check::{Check, Interpretation};
use crate::live::LiveContext;
use crate::probes::{EventMatcher, KafkaOp, KafkaProbe};
use crate::suite::{Suite, SuiteKind};

/// Matches any record whose payload contains `marker`.
fn marker_matcher(marker: String) -> EventMatcher {
    Arc::new(move |payload: &[u8]| {
        std::str::from_utf8(payload)
            .ok()
            .filter(|text| text.contains(marker.as_str()))
            .map(|_| format!("marker {marker}"))
    })
}

pub fn suite(ctx: &LiveContext) -> Suite {
    let policy = ctx.config.suite_policy;
    let kafka = &ctx.config.kafka;
    let marker = format!("pipecheck-{}", uuid::Uuid::new_v4());

    Suite::new(SuiteKind::Kafka)
        .with_check(Check::new(
            "Kafka broker reachable",
            KafkaProbe::new(&ctx.kafka, KafkaOp::Metadata),
            policy,
            Interpretation::required(format!(
                "broker {} is not reachable",
                kafka.bootstrap_servers
            )),
        ))
        .with_check(Check::new(
            format!("CDC topic {} exists", kafka.cdc_topic),
            KafkaProbe::new(&ctx.kafka, KafkaOp::TopicExists(kafka.cdc_topic.clone())),
            policy,
            Interpretation::required(format!(
                "topic {} does not exist (has the connector published any change?)",
                kafka.cdc_topic
            )),
        ))
        .with_check(Check::new(
            format!("Probe topic {} can be created", kafka.probe_topic),
            KafkaProbe::new(&ctx.kafka, KafkaOp::EnsureTopic(kafka.probe_topic.clone())),
            policy,
            Interpretation::required(format!("could not create topic {}", kafka.probe_topic)),
        ))
        .with_check(
            Check::new(
                "Produce/consume round trip",
                KafkaProbe::new(
                    &ctx.kafka,
                    KafkaOp::Produce {
                        topic: kafka.probe_topic.clone(),
                        key: marker.clone(),
                        payload: json!({ "pipecheck_marker": marker }).to_string(),
                    },
                ),
                policy,
                Interpretation::required(format!(
                    "round trip on {} did not complete",
                    kafka.probe_topic
                )),
            )
            .then(
                KafkaProbe::new(
                    &ctx.kafka,
                    KafkaOp::FindEvent {
                        topic: kafka.probe_topic.clone(),
                        matcher: marker_matcher(marker),
                    },
                ),
                policy,
            ),
        )
        .with_check(Check::new(
            format!("Consumer group {} is Stable", kafka.indexer_group),
            KafkaProbe::new(&ctx.kafka, KafkaOp::GroupStable(kafka.indexer_group.clone())),
            policy,
            Interpretation::required(format!(
                "consumer group {} is not Stable (is the indexer running?)",
                kafka.indexer_group
            )),
        ))
}
