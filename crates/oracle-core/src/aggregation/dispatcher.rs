//! Fan-out of one round to its providers.

use super::{
    errors::TransportError,
    events::{EventBus, OracleEvent},
    registry::{OutstandingRequest, RoundRegistry},
    round::RoundState,
    types::{ActionId, OutboundQuery, ProviderRef, RequestId, RoundId},
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outbound side of the oracle: hands one query to one provider.
///
/// Implementations must not block. The provider's answer comes back later
/// through [`AggregationEngine::deliver_response`](super::engine::AggregationEngine::deliver_response)
/// under the query's `request_id`.
pub trait QueryTransport: Send + Sync {
    /// Emits `query` towards `query.provider`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the query could not be handed off.
    fn emit_query(&self, query: OutboundQuery) -> Result<(), TransportError>;
}

/// Summary of one fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub round_id: RoundId,
    pub emitted: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    transport: Arc<dyn QueryTransport>,
    events: EventBus,
}

impl Dispatcher {
    #[must_use]
    pub fn new(transport: Arc<dyn QueryTransport>, events: EventBus) -> Self {
        Self { transport, events }
    }

    /// Registers a round with one request per provider, then emits the queries.
    ///
    /// Every request mapping is in the registry before the first query leaves,
    /// so no response can arrive for an unregistered request. A failed emit is
    /// logged and counted; its mapping stays so the round can still reach
    /// quorum and the request can later be cancelled.
    pub(crate) fn dispatch(
        &self,
        registry: &RoundRegistry,
        round_id: RoundId,
        providers: &[ProviderRef],
        quorum_threshold: usize,
        query: serde_json::Value,
        action: Option<ActionId>,
    ) -> DispatchSummary {
        let assignments: Vec<(RequestId, &ProviderRef)> =
            providers.iter().map(|provider| (RequestId::generate(), provider)).collect();
        let request_ids = assignments.iter().map(|(request_id, _)| *request_id).collect();

        registry.register_round(RoundState::new(
            round_id,
            providers.len(),
            quorum_threshold,
            request_ids,
            action,
        ));
        for (request_id, provider) in &assignments {
            registry.register_request(
                *request_id,
                OutstandingRequest { round_id, provider: (*provider).clone() },
            );
        }

        self.events.emit(OracleEvent::RoundStarted {
            round_id,
            expected_count: providers.len(),
            quorum_threshold,
        });

        let payload = Arc::new(query);
        let mut failed = 0;
        for (request_id, provider) in assignments {
            let outbound = OutboundQuery {
                provider: provider.clone(),
                request_id,
                round_id,
                payload: Arc::clone(&payload),
            };
            if let Err(e) = self.transport.emit_query(outbound) {
                failed += 1;
                warn!(
                    round_id = %round_id,
                    request_id = %request_id,
                    provider = %provider,
                    error = %e,
                    "failed to emit query"
                );
            }
        }

        let emitted = providers.len() - failed;
        debug!(round_id = %round_id, emitted, failed, "round dispatched");
        DispatchSummary { round_id, emitted, failed }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}
