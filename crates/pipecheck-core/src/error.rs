//! Error taxonomy for harness setup and probe failures.

/// Errors raised while building a harness run.
///
/// These surface before any check executes and are reported as usage errors;
/// failures of external systems never appear here, they are carried as
/// [`ProbeError`] inside an `Outcome`.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("invalid retry policy: max_attempts must be at least 1 (got {0})")]
    InvalidRetryPolicy(u32),

    #[error("invalid SQL identifier {0:?}: only [A-Za-z0-9_.] is allowed")]
    InvalidIdentifier(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness setup operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Why a probe could not observe its target.
///
/// Every variant names the target so a failed check message points at the
/// resource that broke.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("{target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("{target} timed out after {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },

    #[error("{target} returned HTTP {status}")]
    Status { target: String, status: u16 },

    #[error("{target} returned a malformed response: {reason}")]
    Malformed { target: String, reason: String },

    #[error("{target} rejected the request: {reason}")]
    Rejected { target: String, reason: String },

    #[error("{target}: {reason}")]
    Assertion { target: String, reason: String },
}

impl ProbeError {
    pub fn unreachable(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unreachable {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(target: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            target: target.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn status(target: impl Into<String>, status: u16) -> Self {
        Self::Status {
            target: target.into(),
            status,
        }
    }

    pub fn malformed(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Malformed {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn rejected(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Rejected {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn assertion(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::Assertion {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Transport-class failures may clear up on a later attempt; an assertion
    /// failure is a definitive answer from a healthy target.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProbeError::Assertion { .. })
    }
}
