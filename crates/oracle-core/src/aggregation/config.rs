//! Aggregation engine configuration types and defaults.

use serde::{Deserialize, Serialize};

/// Largest provider set a single round may fan out to.
pub const DEFAULT_MAX_PROVIDERS: usize = 45;

/// Configuration for the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum providers per round (default: 45)
    #[serde(default = "default_max_providers")]
    pub max_providers: usize,

    /// Quorum used when a caller does not specify one (default: 3)
    #[serde(default = "default_quorum_threshold")]
    pub default_quorum_threshold: usize,

    /// Number of finalized rounds kept in the answer history (default: 1024)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Buffered events per subscriber before slow subscribers start lagging (default: 1024)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Upper bound on a single follow-up effect in seconds (default: 30)
    #[serde(default = "default_effect_timeout_seconds")]
    pub effect_timeout_seconds: u64,
}

fn default_max_providers() -> usize {
    DEFAULT_MAX_PROVIDERS
}

fn default_quorum_threshold() -> usize {
    3
}

fn default_history_capacity() -> usize {
    1024
}

fn default_event_capacity() -> usize {
    1024
}

fn default_effect_timeout_seconds() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_providers: default_max_providers(),
            default_quorum_threshold: default_quorum_threshold(),
            history_capacity: default_history_capacity(),
            event_capacity: default_event_capacity(),
            effect_timeout_seconds: default_effect_timeout_seconds(),
        }
    }
}

impl EngineConfig {
    /// Returns the effect timeout as a [`Duration`](std::time::Duration).
    #[must_use]
    pub fn effect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.effect_timeout_seconds)
    }

    /// Validates internal consistency of the engine settings.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if any value is zero or the default
    /// quorum cannot be satisfied by the maximum provider count.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_providers == 0 {
            return Err("Max providers must be greater than 0".to_string());
        }
        if self.default_quorum_threshold == 0 {
            return Err("Default quorum threshold must be greater than 0".to_string());
        }
        if self.default_quorum_threshold > self.max_providers {
            return Err(format!(
                "Default quorum threshold {} exceeds max providers {}",
                self.default_quorum_threshold, self.max_providers
            ));
        }
        if self.history_capacity == 0 {
            return Err("History capacity must be greater than 0".to_string());
        }
        if self.event_capacity == 0 {
            return Err("Event capacity must be greater than 0".to_string());
        }
        if self.effect_timeout_seconds == 0 {
            return Err("Effect timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}
