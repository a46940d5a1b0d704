//! Builder pattern for initializing the oracle runtime.

use crate::{
    aggregation::{action::EffectHandler, dispatcher::QueryTransport, engine::AggregationEngine},
    config::AppConfig,
    metrics::MetricsCollector,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{
    effects::{EffectWorker, LoggingEffectHandler},
    lifecycle::OracleRuntime,
};

/// Errors that can occur during runtime initialization.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// No query transport supplied
    #[error("No query transport configured")]
    MissingTransport,
}

/// Builder for constructing an [`OracleRuntime`].
///
/// A transport is required. Without an effect handler, fired actions are only
/// logged.
///
/// # Examples
///
/// ```no_run
/// # use oracle_core::{
/// #     aggregation::{OutboundQuery, QueryTransport, TransportError},
/// #     config::AppConfig,
/// #     runtime::OracleRuntimeBuilder,
/// # };
/// # use std::sync::Arc;
/// # struct Http;
/// # impl QueryTransport for Http {
/// #     fn emit_query(&self, _: OutboundQuery) -> Result<(), TransportError> { Ok(()) }
/// # }
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let runtime = OracleRuntimeBuilder::new()
///     .with_config(AppConfig::load()?)
///     .with_transport(Arc::new(Http))
///     .build()?;
///
/// let round_id = runtime.start_configured_round(serde_json::json!({"pair": "ETH/USD"}), None)?;
/// # let _ = round_id;
/// runtime.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct OracleRuntimeBuilder {
    config: Option<AppConfig>,
    transport: Option<Arc<dyn QueryTransport>>,
    effect_handler: Option<Arc<dyn EffectHandler>>,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_channel_capacity: usize,
}

impl OracleRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            transport: None,
            effect_handler: None,
            metrics: None,
            shutdown_channel_capacity: 16,
        }
    }

    /// Sets the configuration. Defaults to [`AppConfig::default`].
    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn QueryTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_effect_handler(mut self, handler: Arc<dyn EffectHandler>) -> Self {
        self.effect_handler = Some(handler);
        self
    }

    /// Shares an existing metrics collector instead of creating one.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Sets custom shutdown channel capacity (default: 16).
    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.shutdown_channel_capacity = capacity;
        self
    }

    /// Builds the engine and starts the effect worker.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if the configuration is invalid or no transport
    /// was supplied.
    pub fn build(self) -> Result<OracleRuntime, RuntimeError> {
        let config = self.config.unwrap_or_default();
        config.validate().map_err(RuntimeError::ConfigValidation)?;

        let transport = self.transport.ok_or(RuntimeError::MissingTransport)?;

        info!(
            environment = %config.environment,
            providers = config.to_provider_refs().len(),
            default_quorum = config.engine.default_quorum_threshold,
            custom_effect_handler = self.effect_handler.is_some(),
            "initializing oracle runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.shutdown_channel_capacity.max(1));

        let metrics = self.metrics.unwrap_or_else(|| Arc::new(MetricsCollector::new()));
        debug!("metrics collector initialized");

        let (engine, effects_rx) =
            AggregationEngine::new(config.engine.clone(), transport, metrics);
        let engine = Arc::new(engine);
        debug!("aggregation engine initialized");

        let handler = self.effect_handler.unwrap_or_else(|| Arc::new(LoggingEffectHandler));
        let effect_task = EffectWorker::new(
            Arc::clone(&engine),
            handler,
            config.engine.effect_timeout(),
        )
        .start_with_shutdown(effects_rx, shutdown_tx.subscribe());
        debug!("effect worker started");

        info!("oracle runtime initialization complete");
        Ok(OracleRuntime::new(engine, config, shutdown_tx, effect_task))
    }
}

impl Default for OracleRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
