//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `set_default` calls and struct `Default` implementations
//! 2. **Config file**: TOML file specified by the `ORACLE_CONFIG` env var
//! 3. **Environment variables**: `ORACLE__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`EngineConfig`]: round limits, answer history and event buffering
//! - [`ProviderConfig`]: data providers queried by each round
//! - [`LoggingConfig`]: log level and format
//! - [`MetricsConfig`]: Prometheus recorder toggle
//! - [`SimulationConfig`]: parameters for the CLI's simulated providers
//!
//! # Example
//!
//! ```toml
//! [engine]
//! max_providers = 45
//! default_quorum_threshold = 3
//!
//! [[providers]]
//! name = "node-1"
//! endpoint = "https://node-1.example.com"
//! ```

use crate::aggregation::{config::EngineConfig, types::ProviderRef};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::Path, time::Duration};

/// One data provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name, used in logs and events.
    pub name: String,

    /// Opaque address handed to the query transport.
    pub endpoint: String,

    /// Disabled providers are left out of new rounds. Defaults to `true`.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset. Defaults to `info`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format, `json` or `pretty`. Defaults to `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Simulated provider behaviour for `oracle-cli simulate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Rounds to run. Defaults to `5`.
    #[serde(default = "default_rounds")]
    pub rounds: u32,

    /// Value providers report around. Defaults to `1_000_000`.
    #[serde(default = "default_base_value")]
    pub base_value: u64,

    /// Maximum deviation from `base_value` in either direction. Defaults to `500`.
    #[serde(default = "default_spread")]
    pub spread: u64,

    /// Upper bound on each provider's response delay in milliseconds. Defaults to `50`.
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// Fraction of queries a provider never answers, in `[0, 1]`. Defaults to `0.0`.
    #[serde(default)]
    pub fault_ratio: f64,

    /// Effect target queued with every round, if set.
    #[serde(default)]
    pub action_target: Option<String>,
}

fn default_rounds() -> u32 {
    5
}

fn default_base_value() -> u64 {
    1_000_000
}

fn default_spread() -> u64 {
    500
}

fn default_max_jitter_ms() -> u64 {
    50
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rounds: default_rounds(),
            base_value: default_base_value(),
            spread: default_spread(),
            max_jitter_ms: default_max_jitter_ms(),
            fault_ratio: 0.0,
            action_target: None,
        }
    }
}

impl SimulationConfig {
    #[must_use]
    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deployment environment name. Defaults to `development`.
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_providers() -> Vec<ProviderConfig> {
    (1..=5)
        .map(|i| ProviderConfig {
            name: format!("node-{i}"),
            endpoint: format!("sim://node-{i}"),
            enabled: true,
        })
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            engine: EngineConfig::default(),
            providers: default_providers(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `ORACLE__` prefix can override any value.
    /// Use `__` as a separator for nested fields (e.g.
    /// `ORACLE__ENGINE__DEFAULT_QUORUM_THRESHOLD=4`). A missing file is not an
    /// error; defaults apply.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("environment", "development")?
            .set_default("engine.max_providers", 45)?
            .set_default("engine.default_quorum_threshold", 3)?
            .set_default("engine.history_capacity", 1024)?
            .set_default("engine.event_capacity", 1024)?
            .set_default("engine.effect_timeout_seconds", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .set_default("metrics.enabled", true)?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("ORACLE").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The path can be overridden with the `ORACLE_CONFIG` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("ORACLE_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Enabled providers, in configuration order.
    #[must_use]
    pub fn to_provider_refs(&self) -> Vec<ProviderRef> {
        self.providers
            .iter()
            .filter(|p| p.enabled)
            .map(|p| ProviderRef::new(p.name.as_str(), p.endpoint.as_str()))
            .collect()
    }

    /// Validates the configuration.
    ///
    /// Checks that:
    /// - At least one provider is enabled and every provider has a unique name
    ///   and a non-empty endpoint
    /// - The enabled provider count fits `engine.max_providers` and can meet
    ///   `engine.default_quorum_threshold`
    /// - Engine capacities are non-zero
    /// - Logging format is either `"json"` or `"pretty"`
    /// - `simulation.fault_ratio` lies in `[0, 1]`
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        self.engine.validate()?;

        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.is_empty() {
                return Err("Provider name must not be empty".to_string());
            }
            if !names.insert(provider.name.as_str()) {
                return Err(format!("Duplicate provider name: {}", provider.name));
            }
            if provider.endpoint.is_empty() {
                return Err(format!("Empty endpoint for provider: {}", provider.name));
            }
        }

        let enabled = self.providers.iter().filter(|p| p.enabled).count();
        if enabled == 0 {
            return Err("No enabled providers configured".to_string());
        }
        if enabled > self.engine.max_providers {
            return Err(format!(
                "{enabled} enabled providers exceeds max_providers {}",
                self.engine.max_providers
            ));
        }
        if self.engine.default_quorum_threshold > enabled {
            return Err(format!(
                "Default quorum threshold {} exceeds {enabled} enabled providers",
                self.engine.default_quorum_threshold
            ));
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        if !(0.0..=1.0).contains(&self.simulation.fault_ratio) {
            return Err(format!(
                "Simulation fault ratio must be within [0, 1], got {}",
                self.simulation.fault_ratio
            ));
        }

        Ok(())
    }
}
