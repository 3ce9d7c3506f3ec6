//! Scripted stand-ins for live systems (testing only)
//!
//! Provides `ScriptedProbe` and `ScriptedBackend`, which replay fixed
//! outcome sequences and count how often they were asked, so retry and
//! short-circuit behaviour can be verified without any infrastructure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::outcome::Outcome;
use crate::probe::Probe;
use crate::scenario::{PipelineBackend, Stage};
use crate::token::PipelineToken;

/// Shared invocation counter.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicU32>);

impl CallCounter {
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// ScriptedProbe
// ---------------------------------------------------------------------------

/// Probe that returns its script in order, repeating the last entry forever.
#[derive(Debug)]
pub struct ScriptedProbe {
    target: String,
    script: Vec<Outcome>,
    calls: CallCounter,
}

impl ScriptedProbe {
    pub fn new(target: impl Into<String>, script: Vec<Outcome>) -> Self {
        Self {
            target: target.into(),
            script,
            calls: CallCounter::default(),
        }
    }

    /// Always return `outcome`.
    pub fn always(target: impl Into<String>, outcome: Outcome) -> Self {
        Self::new(target, vec![outcome])
    }

    /// `absent_first` Absent outcomes, then `Success(detail)`.
    pub fn succeed_after(target: impl Into<String>, absent_first: usize, detail: &str) -> Self {
        let mut script = vec![Outcome::Absent; absent_first];
        script.push(Outcome::success(detail));
        Self::new(target, script)
    }

    /// Counter that stays valid after the probe is moved into a check.
    pub fn calls_handle(&self) -> CallCounter {
        self.calls.clone()
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    fn target(&self) -> String {
        self.target.clone()
    }

    async fn observe(&self) -> Outcome {
        let index = self.calls.bump() as usize;
        self.script
            .get(index)
            .or_else(|| self.script.last())
            .cloned()
            .unwrap_or(Outcome::Absent)
    }
}

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// Pipeline backend with one script per stage.
///
/// Stages without a script succeed immediately.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<Stage, Vec<Outcome>>>,
    calls: Mutex<HashMap<Stage, u32>>,
    tokens: Mutex<Vec<PipelineToken>>,
    cleanups: CallCounter,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stage succeeds on its first attempt.
    pub fn healthy() -> Self {
        Self::default()
    }

    /// Replace the script for `stage`.
    pub fn with_script(self, stage: Stage, script: Vec<Outcome>) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.insert(stage, script);
        }
        self
    }

    /// `stage` never succeeds: it returns Absent on every attempt.
    pub fn stalled_at(stage: Stage) -> Self {
        Self::new().with_script(stage, vec![Outcome::Absent])
    }

    /// Number of probes issued for `stage`.
    pub fn calls(&self, stage: Stage) -> u32 {
        self.calls
            .lock()
            .map(|calls| calls.get(&stage).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn cleanups(&self) -> u32 {
        self.cleanups.get()
    }

    /// Tokens seen by any stage, in call order.
    pub fn tokens(&self) -> Vec<PipelineToken> {
        self.tokens.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PipelineBackend for ScriptedBackend {
    fn describe(&self, stage: Stage) -> String {
        format!("scripted {}", stage.state_name())
    }

    async fn observe(&self, stage: Stage, token: &PipelineToken) -> Outcome {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.push(token.clone());
        }
        let index = match self.calls.lock() {
            Ok(mut calls) => {
                let count = calls.entry(stage).or_insert(0);
                *count += 1;
                (*count - 1) as usize
            }
            Err(_) => 0,
        };

        let scripts = match self.scripts.lock() {
            Ok(scripts) => scripts,
            Err(_) => return Outcome::Absent,
        };
        match scripts.get(&stage) {
            Some(script) => script
                .get(index)
                .or_else(|| script.last())
                .cloned()
                .unwrap_or(Outcome::Absent),
            None => Outcome::success(format!("{} ok", stage.state_name())),
        }
    }

    async fn cleanup(&self, token: &PipelineToken) -> Outcome {
        self.cleanups.bump();
        Outcome::success(format!("deleted documents for {}", token.derived_email))
    }
}
