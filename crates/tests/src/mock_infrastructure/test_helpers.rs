//! Test Helper Functions and Utilities
//!
//! Common helpers for creating engines, providers and event captures.

use super::transport::RecordingTransport;
use oracle_core::{
    aggregation::{
        AggregationEngine, EffectCommand, EngineConfig, OracleEvent, ProviderRef, RoundId,
        RoundRequest,
    },
    metrics::MetricsCollector,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// Providers `provider-0` through `provider-{count - 1}`.
#[must_use]
pub fn providers(count: usize) -> Vec<ProviderRef> {
    (0..count)
        .map(|i| ProviderRef::new(format!("provider-{i}"), format!("mock://provider-{i}")))
        .collect()
}

/// Engine with default configuration over a fresh [`RecordingTransport`].
#[must_use]
pub fn create_engine(
) -> (Arc<AggregationEngine>, Arc<RecordingTransport>, mpsc::UnboundedReceiver<EffectCommand>) {
    create_engine_with(EngineConfig::default(), Arc::new(RecordingTransport::new()))
}

#[must_use]
pub fn create_engine_with(
    config: EngineConfig,
    transport: Arc<RecordingTransport>,
) -> (Arc<AggregationEngine>, Arc<RecordingTransport>, mpsc::UnboundedReceiver<EffectCommand>) {
    let (engine, effects) =
        AggregationEngine::new(config, transport.clone(), Arc::new(MetricsCollector::new()));
    (Arc::new(engine), transport, effects)
}

/// Starts a round over `count` providers with the given quorum.
///
/// # Panics
///
/// Panics if the engine rejects the round.
#[must_use]
pub fn start_round(engine: &AggregationEngine, count: usize, quorum: usize) -> RoundId {
    engine
        .start_round(RoundRequest::new(providers(count), quorum))
        .unwrap_or_else(|e| panic!("round rejected: {e}"))
}

/// Delivers `values` to the first requests of `round_id`, in emission order.
///
/// # Panics
///
/// Panics if a delivery is rejected or there are fewer requests than values.
pub fn deliver_all(
    engine: &AggregationEngine,
    transport: &RecordingTransport,
    round_id: RoundId,
    values: &[u128],
) {
    let request_ids = transport.request_ids(round_id);
    assert!(request_ids.len() >= values.len(), "round {round_id} has too few requests");
    for (request_id, value) in request_ids.into_iter().zip(values) {
        engine
            .deliver_response(request_id, *value)
            .unwrap_or_else(|e| panic!("delivery rejected: {e}"));
    }
}

/// Every event currently buffered in `events`.
#[must_use]
pub fn drain_events(events: &mut broadcast::Receiver<OracleEvent>) -> Vec<OracleEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
