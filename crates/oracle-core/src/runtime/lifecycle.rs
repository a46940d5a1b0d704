//! Runtime lifecycle management and graceful shutdown.

use crate::{
    aggregation::{
        engine::AggregationEngine,
        errors::OracleError,
        events::OracleEvent,
        types::{Action, RoundId},
    },
    config::AppConfig,
    metrics::MetricsCollector,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::builder::OracleRuntimeBuilder;

/// Owns the aggregation engine and its effect worker.
///
/// `shutdown()` signals the worker, lets it finish every effect already
/// queued and waits for it to exit.
pub struct OracleRuntime {
    engine: Arc<AggregationEngine>,
    config: AppConfig,
    shutdown_tx: broadcast::Sender<()>,
    effect_task: Option<JoinHandle<()>>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl OracleRuntime {
    #[must_use]
    pub fn builder() -> OracleRuntimeBuilder {
        OracleRuntimeBuilder::new()
    }

    pub(super) fn new(
        engine: Arc<AggregationEngine>,
        config: AppConfig,
        shutdown_tx: broadcast::Sender<()>,
        effect_task: JoinHandle<()>,
    ) -> Self {
        Self {
            engine,
            config,
            shutdown_tx,
            effect_task: Some(effect_task),
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn engine(&self) -> &Arc<AggregationEngine> {
        &self.engine
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        self.engine.metrics()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OracleEvent> {
        self.engine.subscribe()
    }

    /// Creates a new shutdown receiver for external shutdown coordination.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Starts a round over the configured, enabled providers with the default
    /// quorum.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Config`] if the configured providers cannot form
    /// a valid round.
    pub fn start_configured_round(
        &self,
        query: serde_json::Value,
        action: Option<Action>,
    ) -> Result<RoundId, OracleError> {
        let mut request = self.engine.round_request(self.config.to_provider_refs()).with_query(query);
        request.action = action;
        self.engine.start_round(request)
    }

    /// Signals the effect worker and waits for it to drain and exit.
    pub async fn shutdown(mut self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("initiating oracle runtime shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!(error = %e, "failed to send shutdown signal (no receivers)");
        }

        if let Some(effect_task) = self.effect_task.take() {
            match effect_task.await {
                Ok(()) => debug!("effect worker completed"),
                Err(e) if e.is_cancelled() => debug!("effect worker cancelled"),
                Err(e) => error!(error = %e, "effect worker failed"),
            }
        }

        let stats = self.engine.stats();
        info!(
            open_rounds = stats.open_rounds,
            failed_actions = self.engine.failed_actions().len(),
            latest_round = %stats.latest_finalized_round,
            "oracle runtime shutdown complete"
        );
    }

    /// Waits for Ctrl+C or an external shutdown signal, then shuts down.
    pub async fn wait_for_shutdown(self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::select! {
            _ = shutdown_rx.recv() => info!("shutdown signal received"),
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for ctrl-c");
                }
                info!("ctrl-c received");
            }
        }
        self.shutdown().await;
    }
}
