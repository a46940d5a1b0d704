//! Effect handler with scripted outcomes.

use async_trait::async_trait;
use oracle_core::aggregation::{EffectError, EffectHandler};
use parking_lot::Mutex;
use std::{collections::VecDeque, time::Duration};

/// One observed call to [`ScriptedEffectHandler::perform`].
#[derive(Debug, Clone, PartialEq)]
pub struct EffectCall {
    pub target: String,
    pub payload: serde_json::Value,
}

/// Returns queued outcomes in order, then `Ok(())` once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedEffectHandler {
    script: Mutex<VecDeque<Result<(), EffectError>>>,
    calls: Mutex<Vec<EffectCall>>,
    delay: Option<Duration>,
}

impl ScriptedEffectHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_outcomes(outcomes: impl IntoIterator<Item = Result<(), EffectError>>) -> Self {
        Self { script: Mutex::new(outcomes.into_iter().collect()), ..Self::default() }
    }

    /// Every call sleeps for `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<EffectCall> {
        self.calls.lock().clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl EffectHandler for ScriptedEffectHandler {
    async fn perform(&self, target: &str, payload: &serde_json::Value) -> Result<(), EffectError> {
        self.calls.lock().push(EffectCall { target: target.to_string(), payload: payload.clone() });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script.lock().pop_front().unwrap_or(Ok(()))
    }
}
