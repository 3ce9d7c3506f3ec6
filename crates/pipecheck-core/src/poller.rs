//! Bounded retry around a probe.
//!
//! Every downstream stage of the pipeline is asynchronous relative to the
//! triggering write, so a single negative observation cannot tell "not yet"
//! from "broken". The poller repeats the probe up to a fixed budget with a
//! fixed delay and keeps the most recent outcome for reporting.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{HarnessError, ProbeError, Result};
use crate::outcome::Outcome;
use crate::probe::Probe;

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempt budget and pacing for one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRetryPolicy", into = "RawRetryPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Build a policy; `max_attempts` must be at least 1.
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(HarnessError::InvalidRetryPolicy(max_attempts));
        }
        Ok(Self {
            max_attempts,
            delay,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        })
    }

    /// A single attempt with no delay.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Upper bound on a single probe attempt, enforced by the poller on top of
    /// the probe's own timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }
}

/// Serialized form of [`RetryPolicy`], validated on the way in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RawRetryPolicy {
    max_attempts: u32,
    delay_ms: u64,
    #[serde(default = "default_attempt_timeout_ms")]
    attempt_timeout_ms: u64,
}

fn default_attempt_timeout_ms() -> u64 {
    DEFAULT_ATTEMPT_TIMEOUT.as_millis() as u64
}

impl TryFrom<RawRetryPolicy> for RetryPolicy {
    type Error = HarnessError;

    fn try_from(raw: RawRetryPolicy) -> Result<Self> {
        Ok(RetryPolicy::new(raw.max_attempts, Duration::from_millis(raw.delay_ms))?
            .with_attempt_timeout(Duration::from_millis(raw.attempt_timeout_ms)))
    }
}

impl From<RetryPolicy> for RawRetryPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts,
            delay_ms: policy.delay.as_millis() as u64,
            attempt_timeout_ms: policy.attempt_timeout.as_millis() as u64,
        }
    }
}

/// Final outcome of a poll plus how it got there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    /// The first success, or the last outcome seen.
    pub outcome: Outcome,

    /// Number of probe invocations made.
    pub attempts: u32,

    /// Wall time spent, including delays.
    pub elapsed: Duration,
}

/// Invoke `probe` until it succeeds, returns a non-retryable error, or the
/// policy's attempt budget is spent.
///
/// The delay is slept only between attempts, never after the last one.
pub async fn poll<P: Probe + ?Sized>(probe: &P, policy: &RetryPolicy) -> PollResult {
    let start = Instant::now();
    let mut attempts = 0;
    let mut last = Outcome::Absent;

    while attempts < policy.max_attempts {
        attempts += 1;
        last = match tokio::time::timeout(policy.attempt_timeout, probe.observe()).await {
            Ok(outcome) => outcome,
            Err(_) => Outcome::Error(ProbeError::timeout(probe.target(), policy.attempt_timeout)),
        };

        debug!(
            target_resource = %probe.target(),
            attempt = attempts,
            max_attempts = policy.max_attempts,
            outcome = last.kind(),
            "probe attempt"
        );

        if !last.is_retryable() {
            break;
        }
        if attempts < policy.max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    PollResult {
        outcome: last,
        attempts,
        elapsed: start.elapsed(),
    }
}
