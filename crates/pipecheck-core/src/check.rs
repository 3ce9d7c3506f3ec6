//! Named assertions built from polled probes.

use tracing::debug;

use crate::outcome::{CheckResult, Outcome, Verdict};
use crate::poller::{poll, RetryPolicy};
use crate::probe::Probe;

/// Static classification table for one check.
///
/// Success is always PASS and an error is always FAIL; only the verdict for
/// "reachable but not there yet" varies between checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    absent_verdict: Verdict,
    absent_message: String,
    failure_context: String,
}

impl Interpretation {
    /// Absent is a failure; `failure_context` prefixes both absent and error messages.
    pub fn required(failure_context: impl Into<String>) -> Self {
        let context = failure_context.into();
        Self {
            absent_verdict: Verdict::Fail,
            absent_message: context.clone(),
            failure_context: context,
        }
    }

    /// Absent is advisory only.
    pub fn advisory(absent_message: impl Into<String>, failure_context: impl Into<String>) -> Self {
        Self {
            absent_verdict: Verdict::Warn,
            absent_message: absent_message.into(),
            failure_context: failure_context.into(),
        }
    }

    /// Override the verdict for an absent outcome.
    pub fn absent_as(mut self, verdict: Verdict, message: impl Into<String>) -> Self {
        self.absent_verdict = verdict;
        self.absent_message = message.into();
        self
    }

    /// Classify an outcome. Pure: the same outcome and attempt count always
    /// produce the same verdict and message.
    pub fn classify(&self, outcome: &Outcome, attempts: u32) -> (Verdict, String) {
        match outcome {
            Outcome::Success(detail) if detail.is_empty() => (Verdict::Pass, "ok".to_string()),
            Outcome::Success(detail) => (Verdict::Pass, detail.clone()),
            Outcome::Absent => (
                self.absent_verdict,
                format!("{} (after {} attempt(s))", self.absent_message, attempts),
            ),
            Outcome::Error(err) => (
                Verdict::Fail,
                format!("{}: {} (after {} attempt(s))", self.failure_context, err, attempts),
            ),
        }
    }
}

/// One polled probe within a check.
pub struct Step {
    probe: Box<dyn Probe>,
    policy: RetryPolicy,
}

/// A named assertion: one or more dependent steps plus an interpretation.
///
/// Steps run in order; the first step that does not succeed decides the result.
pub struct Check {
    name: String,
    steps: Vec<Step>,
    interpretation: Interpretation,
}

impl Check {
    pub fn new(
        name: impl Into<String>,
        probe: impl Probe + 'static,
        policy: RetryPolicy,
        interpretation: Interpretation,
    ) -> Self {
        Self {
            name: name.into(),
            steps: vec![Step {
                probe: Box::new(probe),
                policy,
            }],
            interpretation,
        }
    }

    /// Append a dependent step, run only if every earlier step succeeded.
    pub fn then(mut self, probe: impl Probe + 'static, policy: RetryPolicy) -> Self {
        self.steps.push(Step {
            probe: Box::new(probe),
            policy,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute all steps and classify the deciding outcome.
    pub async fn run(&self) -> CheckResult {
        let mut details = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let polled = poll(step.probe.as_ref(), &step.policy).await;
            debug!(
                check = %self.name,
                target_resource = %step.probe.target(),
                attempts = polled.attempts,
                elapsed_ms = polled.elapsed.as_millis() as u64,
                outcome = polled.outcome.kind(),
                "check step finished"
            );

            match polled.outcome {
                Outcome::Success(detail) => details.push(detail),
                other => {
                    let (verdict, message) = self.interpretation.classify(&other, polled.attempts);
                    return CheckResult::new(&self.name, verdict, message);
                }
            }
        }

        let combined = details
            .into_iter()
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        let (verdict, message) = self
            .interpretation
            .classify(&Outcome::Success(combined), 1);
        CheckResult::new(&self.name, verdict, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::fakes::ScriptedProbe;
    use std::time::Duration;

    #[test]
    fn required_absent_fails() {
        let rules = Interpretation::required("connector is not registered");
        let (verdict, message) = rules.classify(&Outcome::Absent, 3);
        assert_eq!(verdict, Verdict::Fail);
        assert_eq!(message, "connector is not registered (after 3 attempt(s))");
    }

    #[test]
    fn advisory_absent_warns() {
        let rules = Interpretation::advisory("cluster health is yellow", "cluster health unavailable");
        let (verdict, _) = rules.classify(&Outcome::Absent, 1);
        assert_eq!(verdict, Verdict::Warn);
    }

    #[test]
    fn error_always_fails_with_context() {
        let rules = Interpretation::advisory("empty", "index count unavailable");
        let err = ProbeError::status("GET http://os:9200/profiles/_count", 500);
        let (verdict, message) = rules.classify(&Outcome::Error(err), 2);
        assert_eq!(verdict, Verdict::Fail);
        assert!(message.starts_with("index count unavailable: GET http://os:9200/profiles/_count"));
    }

    #[test]
    fn absent_override() {
        let rules = Interpretation::required("yellow").absent_as(Verdict::Pass, "yellow accepted");
        let (verdict, message) = rules.classify(&Outcome::Absent, 1);
        assert_eq!(verdict, Verdict::Pass);
        assert!(message.starts_with("yellow accepted"));
    }

    #[tokio::test(start_paused = true)]
    async fn dependent_step_skipped_after_failure() {
        let first = ScriptedProbe::new("produce", vec![Outcome::Absent]);
        let second = ScriptedProbe::new("consume", vec![Outcome::success("found")]);
        let second_calls = second.calls_handle();

        let check = Check::new(
            "round trip",
            first,
            RetryPolicy::once(),
            Interpretation::required("produce failed"),
        )
        .then(second, RetryPolicy::new(3, Duration::from_secs(1)).expect("policy"));

        let result = check.run().await;
        assert_eq!(result.verdict, Verdict::Fail);
        assert_eq!(second_calls.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn all_steps_succeed_joins_details() {
        let check = Check::new(
            "round trip",
            ScriptedProbe::new("produce", vec![Outcome::success("produced at offset 4")]),
            RetryPolicy::once(),
            Interpretation::required("round trip failed"),
        )
        .then(
            ScriptedProbe::new("consume", vec![Outcome::Absent, Outcome::success("consumed")]),
            RetryPolicy::new(3, Duration::from_secs(1)).expect("policy"),
        );

        let result = check.run().await;
        assert_eq!(result.verdict, Verdict::Pass);
        assert_eq!(result.message, "produced at offset 4; consumed");
    }
}
