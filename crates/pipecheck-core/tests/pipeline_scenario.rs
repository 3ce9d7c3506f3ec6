use std::sync::Arc;
use std::time::Duration;

use pipecheck_core::fakes::ScriptedBackend;
use pipecheck_core::{
    HarnessConfig, Outcome, PipelineScenario, PipelineToken, ProbeError, Reporter, RetryPolicy,
    ScenarioState, Stage, StagePolicies, Verdict, ALL_STAGES_PASSED,
};

fn uniform(attempts: u32, delay_secs: u64) -> StagePolicies {
    StagePolicies::uniform(
        RetryPolicy::new(attempts, Duration::from_secs(delay_secs)).expect("valid policy"),
    )
}

async fn run(backend: &Arc<ScriptedBackend>, policies: StagePolicies) -> (ScenarioState, Reporter) {
    let scenario = PipelineScenario::new(backend.clone(), policies);
    let mut reporter = Reporter::new();
    let report = scenario
        .run_with_token(PipelineToken::from_seed(1_700_000_000), &mut reporter)
        .await;
    (report.state, reporter)
}

// ── Short-circuit ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn blocked_stage_stops_every_later_stage() {
    for blocked in Stage::ALL {
        let backend = Arc::new(ScriptedBackend::stalled_at(blocked));
        let (state, reporter) = run(&backend, uniform(3, 1)).await;

        assert_eq!(state, ScenarioState::Blocked(blocked));
        for stage in Stage::ALL {
            let expected = if stage.ordinal() < blocked.ordinal() {
                1
            } else if stage == blocked {
                3
            } else {
                0
            };
            assert_eq!(backend.calls(stage), expected, "{blocked} blocked, {stage} probed");
        }

        let checks = reporter.checks();
        assert_eq!(checks.len(), blocked.ordinal());
        let last = &checks[checks.len() - 1].result;
        assert_eq!(last.name, blocked.check_name());
        assert_eq!(last.verdict, Verdict::Fail);
        assert!(last.message.contains(blocked.inspect_hint()));

        let note = format!(
            "PIPELINE BLOCKED at stage {}/5 ({})",
            blocked.ordinal(),
            blocked.state_name()
        );
        assert!(reporter.notes().iter().any(|n| n.starts_with(&note)), "{note}");
    }
}

#[tokio::test(start_paused = true)]
async fn cdc_never_captures_the_insert() {
    let backend = Arc::new(ScriptedBackend::stalled_at(Stage::Captured));
    let (state, reporter) = run(&backend, HarnessConfig::default().stages).await;

    assert_eq!(state, ScenarioState::Blocked(Stage::Captured));
    assert_eq!(backend.calls(Stage::Inserted), 1);
    assert_eq!(backend.calls(Stage::Captured), 6);
    assert_eq!(backend.calls(Stage::Published), 0);
    assert_eq!(backend.calls(Stage::Indexed), 0);
    assert_eq!(backend.cleanups(), 0);

    let failed = &reporter.checks()[1].result;
    assert_eq!(failed.name, "CDC captures the INSERT");
    assert!(failed.message.contains("CDC did not capture"));
    assert!(failed.message.contains("e2e-1700000000@pipecheck.test"));
    assert!(failed.message.contains("(after 6 attempt(s))"));
    assert!(failed.message.contains("over 10.0s"));

    let summary = reporter.finalize();
    assert_eq!(summary.exit_code, 1);
    assert!(summary.text.contains("- CDC captures the INSERT"));
    assert!(summary.text.contains("PIPELINE BLOCKED at stage 2/5 (CAPTURED)"));
}

#[tokio::test(start_paused = true)]
async fn assertion_blocks_without_retrying() {
    let backend = Arc::new(ScriptedBackend::new().with_script(
        Stage::Published,
        vec![Outcome::Error(ProbeError::assertion(
            "kafka",
            "topic is compacted away",
        ))],
    ));
    let (state, _) = run(&backend, uniform(6, 2)).await;

    assert_eq!(state, ScenarioState::Blocked(Stage::Published));
    assert_eq!(backend.calls(Stage::Published), 1);
    assert_eq!(backend.calls(Stage::Indexed), 0);
}

// ── Success ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn all_stages_pass() {
    let backend = Arc::new(ScriptedBackend::healthy());
    let (state, reporter) = run(&backend, HarnessConfig::default().stages).await;

    assert_eq!(state, ScenarioState::Reached(Stage::Queried));
    assert!(state.is_success());
    assert_eq!(reporter.checks().len(), 5);
    assert!(reporter
        .checks()
        .iter()
        .all(|c| c.result.verdict == Verdict::Pass));
    assert_eq!(backend.cleanups(), 1);

    let summary = reporter.finalize();
    assert_eq!(summary.exit_code, 0);
    assert!(summary.text.contains(ALL_STAGES_PASSED));
    assert!(summary.text.contains("correlation_id=e2e-1700000000"));
}

#[tokio::test(start_paused = true)]
async fn slow_indexing_is_waited_for() {
    let backend = Arc::new(ScriptedBackend::new().with_script(
        Stage::Indexed,
        vec![
            Outcome::Absent,
            Outcome::Absent,
            Outcome::Absent,
            Outcome::success("document _id=9 indexed in profiles"),
        ],
    ));
    let (state, reporter) = run(&backend, HarnessConfig::default().stages).await;

    assert!(state.is_success());
    assert_eq!(backend.calls(Stage::Indexed), 4);
    assert_eq!(
        reporter.checks()[3].result.message,
        "document _id=9 indexed in profiles"
    );
}

#[tokio::test(start_paused = true)]
async fn every_stage_sees_the_same_token() {
    let backend = Arc::new(ScriptedBackend::healthy());
    run(&backend, uniform(1, 0)).await;

    let tokens = backend.tokens();
    assert_eq!(tokens.len(), 5);
    assert!(tokens.iter().all(|t| t.correlation_id == "e2e-1700000000"));
}

// ── Cleanup ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cleanup_only_after_indexing() {
    let blocked_at_query = Arc::new(ScriptedBackend::stalled_at(Stage::Queried));
    run(&blocked_at_query, uniform(2, 1)).await;
    assert_eq!(blocked_at_query.cleanups(), 1);

    let blocked_at_index = Arc::new(ScriptedBackend::stalled_at(Stage::Indexed));
    run(&blocked_at_index, uniform(2, 1)).await;
    assert_eq!(blocked_at_index.cleanups(), 0);
}

#[tokio::test(start_paused = true)]
async fn cleanup_is_never_a_check() {
    let backend = Arc::new(ScriptedBackend::healthy());
    let (_, reporter) = run(&backend, uniform(1, 0)).await;

    assert!(reporter
        .checks()
        .iter()
        .all(|c| Stage::ALL.iter().any(|s| s.check_name() == c.result.name)));
}
