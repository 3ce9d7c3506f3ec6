//! The live suite catalog.

pub mod api;
pub mod debezium;
pub mod kafka;
pub mod monitoring;
pub mod opensearch;
pub mod sqlserver;

use std::sync::Arc;

use crate::live::{LiveContext, LivePipelineBackend};
use crate::runner::Runnable;
use crate::scenario::PipelineScenario;
use crate::suite::SuiteKind;

/// Build the live checks for `kind`.
pub fn build(kind: SuiteKind, ctx: &LiveContext) -> Runnable {
    match kind {
        SuiteKind::Sqlserver => Runnable::Checks(sqlserver::suite(ctx)),
        SuiteKind::Kafka => Runnable::Checks(kafka::suite(ctx)),
        SuiteKind::Opensearch => Runnable::Checks(opensearch::suite(ctx)),
        SuiteKind::Debezium => Runnable::Checks(debezium::suite(ctx)),
        SuiteKind::Api => Runnable::Checks(api::suite(ctx)),
        SuiteKind::Monitoring => Runnable::Checks(monitoring::suite(ctx)),
        SuiteKind::Pipeline => Runnable::Scenario(PipelineScenario::new(
            Arc::new(LivePipelineBackend::new(ctx.clone())),
            ctx.config.stages,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;

    #[test]
    fn every_kind_builds_its_own_suite() {
        let ctx = LiveContext::new(HarnessConfig::default()).expect("context");
        for kind in SuiteKind::all() {
            let runnable = build(kind, &ctx);
            assert_eq!(runnable.kind(), kind);
            assert!(runnable.check_count() > 0);
        }
    }
}
