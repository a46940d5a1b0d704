//! Background execution of fired actions.

use crate::aggregation::{
    action::{ActionRecord, EffectCommand, EffectHandler},
    engine::AggregationEngine,
    errors::EffectError,
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info};

/// Effect handler that only logs. Used when no real handler is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEffectHandler;

#[async_trait]
impl EffectHandler for LoggingEffectHandler {
    async fn perform(&self, target: &str, payload: &serde_json::Value) -> Result<(), EffectError> {
        info!(target_name = %target, payload = %payload, "effect performed");
        Ok(())
    }
}

/// Drains the engine's effect queue, one effect at a time, in firing order.
///
/// Each effect is bounded by `timeout`; an elapsed timeout is reported as
/// [`EffectError::Timeout`]. Outcomes go back to the engine through
/// [`AggregationEngine::complete_action`].
pub struct EffectWorker {
    engine: Arc<AggregationEngine>,
    handler: Arc<dyn EffectHandler>,
    timeout: Duration,
}

impl EffectWorker {
    #[must_use]
    pub fn new(
        engine: Arc<AggregationEngine>,
        handler: Arc<dyn EffectHandler>,
        timeout: Duration,
    ) -> Self {
        Self { engine, handler, timeout }
    }

    /// Spawns the worker loop.
    ///
    /// On shutdown the queue is closed and every command already queued is
    /// still executed before the task exits.
    pub fn start_with_shutdown(
        self,
        mut commands: mpsc::UnboundedReceiver<EffectCommand>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    command = commands.recv() => {
                        let Some(command) = command else { break };
                        self.execute(command).await;
                    }
                    _ = shutdown_rx.recv() => {
                        commands.close();
                        while let Some(command) = commands.recv().await {
                            self.execute(command).await;
                        }
                        info!("effect worker shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// Performs one effect and reports its outcome.
    pub async fn execute(&self, command: EffectCommand) -> Option<ActionRecord> {
        debug!(
            round_id = %command.round_id,
            action_id = %command.action_id,
            target_name = %command.target,
            "performing effect"
        );
        let result =
            tokio::time::timeout(self.timeout, self.handler.perform(&command.target, &command.payload))
                .await
                .unwrap_or(Err(EffectError::Timeout));

        self.engine.complete_action(command.action_id, result)
    }
}
