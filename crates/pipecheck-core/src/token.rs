//! Identifiers for the row injected by the pipeline scenario.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Last seed handed out in this process.
static LAST_SEED: AtomicU64 = AtomicU64::new(0);

/// Values that make the injected test row recognisable at every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineToken {
    pub correlation_id: String,
    pub derived_email: String,
    pub derived_name: String,
}

impl PipelineToken {
    /// Build a token from an explicit seed (normally a unix timestamp).
    pub fn from_seed(seed: u64) -> Self {
        let correlation_id = format!("e2e-{seed}");
        Self {
            derived_email: format!("{correlation_id}@pipecheck.test"),
            derived_name: format!("Pipecheck E2E {seed}"),
            correlation_id,
        }
    }

    /// Build a token from the wall clock.
    ///
    /// The seed is the current unix time in seconds, bumped past the last seed
    /// issued in this process so two tokens never share an id.
    pub fn generate() -> Self {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        Self::from_seed(next_seed(now))
    }
}

fn next_seed(now: u64) -> u64 {
    let mut last = LAST_SEED.load(Ordering::SeqCst);
    loop {
        let candidate = now.max(last + 1);
        match LAST_SEED.compare_exchange(last, candidate, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return candidate,
            Err(observed) => last = observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_determines_all_fields() {
        let token = PipelineToken::from_seed(1_700_000_000);
        assert_eq!(token.correlation_id, "e2e-1700000000");
        assert_eq!(token.derived_email, "e2e-1700000000@pipecheck.test");
        assert_eq!(token.derived_name, "Pipecheck E2E 1700000000");
    }

    #[test]
    fn generated_ids_never_repeat() {
        let a = PipelineToken::generate();
        let b = PipelineToken::generate();
        let c = PipelineToken::generate();
        assert_ne!(a.correlation_id, b.correlation_id);
        assert_ne!(b.correlation_id, c.correlation_id);
        assert_ne!(a.correlation_id, c.correlation_id);
    }

    #[test]
    fn seed_never_goes_backwards() {
        let high = next_seed(u64::MAX / 2);
        let after = next_seed(5);
        assert!(after > high);
    }
}
