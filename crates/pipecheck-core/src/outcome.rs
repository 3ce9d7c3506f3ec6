//! Observation outcomes, verdicts and check results.

use serde::{Deserialize, Serialize};

use crate::error::ProbeError;

/// What a single probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The expected condition holds; the detail is shown in the check message.
    Success(String),

    /// The target answered but the condition has not happened yet.
    Absent,

    /// The target could not be observed, or answered with a definitive violation.
    Error(ProbeError),
}

impl Outcome {
    pub fn success(detail: impl Into<String>) -> Self {
        Outcome::Success(detail.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Whether another attempt could produce a different outcome.
    pub fn is_retryable(&self) -> bool {
        match self {
            Outcome::Success(_) => false,
            Outcome::Absent => true,
            Outcome::Error(err) => err.is_retryable(),
        }
    }

    /// Short tag used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success(_) => "success",
            Outcome::Absent => "absent",
            Outcome::Error(err) if err.is_retryable() => "error",
            Outcome::Error(_) => "assertion",
        }
    }
}

impl From<ProbeError> for Outcome {
    fn from(err: ProbeError) -> Self {
        Outcome::Error(err)
    }
}

/// Classification of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Warn,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Warn => "WARN",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pass" => Ok(Verdict::Pass),
            "fail" => Ok(Verdict::Fail),
            "warn" => Ok(Verdict::Warn),
            other => Err(format!("unknown verdict {other:?} (expected pass, warn or fail)")),
        }
    }
}

/// Classified result of one check execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub verdict: Verdict,
    pub message: String,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, verdict: Verdict, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verdict,
            message: message.into(),
        }
    }

    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Verdict::Pass, message)
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Verdict::Fail, message)
    }

    pub fn warn(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Verdict::Warn, message)
    }

    /// One-line console rendering: `[PASS] name: message`.
    pub fn render_line(&self) -> String {
        format!("[{}] {}: {}", self.verdict, self.name, self.message)
    }
}
