//! Aggregation engine: the entry point for rounds, responses and cancellations.
//!
//! The engine owns every piece of aggregation state for one oracle instance.
//! Construct a fresh engine per independent oracle (and per test); there is no
//! global state besides the metrics recorder.

use super::{
    action::{ActionExecutor, ActionRecord, EffectCommand},
    config::EngineConfig,
    dispatcher::{Dispatcher, QueryTransport},
    errors::{EffectError, OracleError},
    events::{EventBus, OracleEvent},
    registry::{CancelOutcome, DeliveryOutcome, OutstandingRequest, RoundHooks, RoundRegistry},
    round::{FinalizeDecision, RoundSnapshot, RoundState},
    types::{
        ActionId, AnswerValue, ExpiryProof, FinalizedAnswer, ProviderRef, RequestId, RoundId,
        RoundRequest,
    },
};
use crate::{
    answer::{AnswerSnapshot, CanonicalAnswer},
    metrics::{MetricsCollector, ResponseOutcome},
};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};

/// Aggregate counters describing the engine's current load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub open_rounds: usize,
    pub outstanding_requests: usize,
    pub pending_actions: usize,
    pub latest_finalized_round: RoundId,
    pub current_value: AnswerValue,
    pub finalized_at: u64,
}

pub struct AggregationEngine {
    config: EngineConfig,
    registry: RoundRegistry,
    answer: CanonicalAnswer,
    dispatcher: Dispatcher,
    actions: ActionExecutor,
    events: EventBus,
    /// Fired actions waiting for the effect worker.
    effects: mpsc::UnboundedSender<EffectCommand>,
    metrics: Arc<MetricsCollector>,
    next_round: AtomicU64,
}

impl AggregationEngine {
    /// Creates an engine and the receiving end of its effect queue.
    ///
    /// The caller is expected to drive the receiver (see
    /// [`EffectWorker`](crate::runtime::EffectWorker)) and report outcomes via
    /// [`complete_action`](Self::complete_action). If the receiver is dropped,
    /// fired actions fail with [`EffectError::WorkerUnavailable`].
    #[must_use]
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn QueryTransport>,
        metrics: Arc<MetricsCollector>,
    ) -> (Self, mpsc::UnboundedReceiver<EffectCommand>) {
        let (effects, effects_rx) = mpsc::unbounded_channel();
        let events = EventBus::new(config.event_capacity);

        let engine = Self {
            registry: RoundRegistry::new(),
            answer: CanonicalAnswer::new(config.history_capacity),
            dispatcher: Dispatcher::new(transport, events.clone()),
            actions: ActionExecutor::new(events.clone()),
            events,
            effects,
            metrics,
            next_round: AtomicU64::new(1),
            config,
        };

        (engine, effects_rx)
    }

    /// Builds a round request over `providers` using the configured default quorum.
    #[must_use]
    pub fn round_request(&self, providers: Vec<ProviderRef>) -> RoundRequest {
        RoundRequest::new(providers, self.config.default_quorum_threshold)
    }

    /// Opens a round and queries every provider once, in order.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Config`] if the provider set is empty or exceeds
    /// `max_providers`, or if the quorum is zero or above the provider count. No
    /// round id is consumed in that case.
    pub fn start_round(&self, request: RoundRequest) -> Result<RoundId, OracleError> {
        let RoundRequest { providers, quorum_threshold, query, action } = request;

        if let Err(e) =
            RoundState::check_params(providers.len(), quorum_threshold, self.config.max_providers)
        {
            warn!(error = %e, providers = providers.len(), quorum_threshold, "round rejected");
            self.metrics.record_error(&e);
            return Err(e);
        }

        let round_id = RoundId::new(self.next_round.fetch_add(1, Ordering::SeqCst));
        let action_id = action.map(|action| self.actions.queue(round_id, action));

        let summary = self.dispatcher.dispatch(
            &self.registry,
            round_id,
            &providers,
            quorum_threshold,
            query,
            action_id,
        );

        self.metrics.record_round_started(providers.len());
        self.metrics.record_transport_errors(summary.failed);
        self.metrics.record_open_rounds(self.registry.open_rounds());

        info!(
            round_id = %round_id,
            providers = providers.len(),
            quorum_threshold,
            has_action = action_id.is_some(),
            "round started"
        );
        Ok(round_id)
    }

    /// Delivers one provider answer.
    ///
    /// Records the value, finalizes the round when it reaches quorum and purges
    /// it once every expected response is in.
    ///
    /// # Errors
    ///
    /// - [`OracleError::UnknownRequest`] for duplicate, late or unknown request
    ///   ids. This is expected under asynchronous delivery and safe to ignore.
    /// - [`OracleError::Range`] if aggregation hit an internal invariant
    ///   violation. The response is still recorded.
    pub fn deliver_response(
        &self,
        request_id: RequestId,
        value: AnswerValue,
    ) -> Result<DeliveryOutcome, OracleError> {
        match self.registry.resolve_and_record(request_id, value, self) {
            Ok(outcome) => {
                let label = match outcome {
                    DeliveryOutcome::Recorded { .. } => ResponseOutcome::Recorded,
                    DeliveryOutcome::Dropped { .. } => ResponseOutcome::Dropped,
                };
                self.metrics.record_response(label);
                Ok(outcome)
            }
            Err(e) => {
                if e.is_benign() {
                    self.metrics.record_response(ResponseOutcome::Unknown);
                }
                self.report_error(&e, request_id);
                Err(e)
            }
        }
    }

    /// Cancels an expired request whose round is older than the latest
    /// finalized round, recording a sentinel in its place.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidState`] if `proof` has not expired yet or the
    ///   round is not older than the latest finalized round
    /// - [`OracleError::UnknownRequest`] if the request is not outstanding
    pub fn cancel_request(
        &self,
        request_id: RequestId,
        proof: ExpiryProof,
    ) -> Result<CancelOutcome, OracleError> {
        let now = chrono::Utc::now();
        if proof.expires_at > now {
            let e = OracleError::InvalidState(format!(
                "request expires at {}, {} seconds from now",
                proof.expires_at,
                (proof.expires_at - now).num_seconds()
            ));
            self.report_error(&e, request_id);
            return Err(e);
        }

        match self.registry.cancel(request_id, self.answer.latest_round(), self) {
            Ok(outcome) => {
                info!(
                    request_id = %request_id,
                    round_id = %outcome.round_id,
                    provider = %outcome.provider,
                    purged = outcome.purged,
                    "request cancelled"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.report_error(&e, request_id);
                Err(e)
            }
        }
    }

    /// Reports the outcome of a fired action's effect.
    ///
    /// Returns the action's final record, or `None` if the action was not in
    /// flight.
    pub fn complete_action(
        &self,
        action_id: ActionId,
        result: Result<(), EffectError>,
    ) -> Option<ActionRecord> {
        let record = self.actions.complete(action_id, result)?;
        self.metrics.record_action(record.executed);
        Some(record)
    }

    /// Finalization gate run after every recorded response.
    fn try_finalize(&self, state: &mut RoundState) -> Result<Option<FinalizedAnswer>, OracleError> {
        let round_id = state.round_id();

        match state.evaluate_finalize(self.answer.latest_round()) {
            FinalizeDecision::Ready => {}
            FinalizeDecision::BelowQuorum { received, required } => {
                trace!(round_id = %round_id, received, required, "below quorum");
                return Ok(None);
            }
            FinalizeDecision::AlreadyFinalized => return Ok(None),
            FinalizeDecision::Stale { latest } => {
                debug!(round_id = %round_id, latest = %latest, "stale round not finalized");
                return Ok(None);
            }
        }

        let value = state.aggregate().inspect_err(|e| {
            error!(round_id = %round_id, error = %e, "aggregation invariant violated");
        })?;

        let Some(snapshot) = self.answer.commit(round_id, value) else {
            return Ok(None);
        };

        let answer = FinalizedAnswer {
            value,
            finalized_at: snapshot.finalized_at,
            response_count: state.received(),
        };
        state.mark_finalized(answer);

        info!(
            round_id = %round_id,
            value = %value,
            responses = answer.response_count,
            finalized_at = answer.finalized_at,
            "answer finalized"
        );
        self.events.emit(OracleEvent::AnswerUpdated {
            value,
            round_id,
            finalized_at: answer.finalized_at,
        });
        self.metrics.record_finalized(state.elapsed());

        if let Some(action_id) = state.action() {
            self.fire_action(round_id, action_id);
        }

        Ok(Some(answer))
    }

    fn fire_action(&self, round_id: RoundId, action_id: ActionId) {
        let Some(command) = self.actions.on_finalize(round_id, action_id) else {
            return;
        };
        if let Err(mpsc::error::SendError(command)) = self.effects.send(command) {
            warn!(round_id = %round_id, action_id = %action_id, "effect worker gone");
            self.complete_action(command.action_id, Err(EffectError::WorkerUnavailable));
        }
    }

    fn report_error(&self, e: &OracleError, request_id: RequestId) {
        if e.is_benign() {
            debug!(request_id = %request_id, error = %e, "request ignored");
        } else if e.is_defect() {
            error!(request_id = %request_id, error = %e, "aggregation defect");
        } else {
            warn!(request_id = %request_id, error = %e, "request rejected");
        }
        self.metrics.record_error(e);
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OracleEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn canonical_answer(&self) -> AnswerSnapshot {
        self.answer.snapshot()
    }

    #[must_use]
    pub fn current_value(&self) -> AnswerValue {
        self.answer.current_value()
    }

    #[must_use]
    pub fn latest_finalized_round(&self) -> RoundId {
        self.answer.latest_round()
    }

    /// Answer a past round finalized with, while it is still in the history.
    #[must_use]
    pub fn answer_for(&self, round_id: RoundId) -> Option<AnswerSnapshot> {
        self.answer.answer_for(round_id)
    }

    #[must_use]
    pub fn round_snapshot(&self, round_id: RoundId) -> Option<RoundSnapshot> {
        self.registry.round_snapshot(round_id)
    }

    #[must_use]
    pub fn action(&self, action_id: ActionId) -> Option<ActionRecord> {
        self.actions.get(action_id)
    }

    #[must_use]
    pub fn failed_actions(&self) -> Vec<(ActionId, ActionRecord)> {
        self.actions.failed_actions()
    }

    /// Removes a failed action after it was resolved manually.
    pub fn take_failed_action(&self, action_id: ActionId) -> Option<ActionRecord> {
        self.actions.take_failed(action_id)
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let answer = self.answer.snapshot();
        EngineStats {
            open_rounds: self.registry.open_rounds(),
            outstanding_requests: self.registry.outstanding_requests(),
            pending_actions: self.actions.pending(),
            latest_finalized_round: answer.round_id,
            current_value: answer.value,
            finalized_at: answer.finalized_at,
        }
    }
}

impl RoundHooks for AggregationEngine {
    fn on_response(
        &self,
        state: &mut RoundState,
        request: &OutstandingRequest,
        value: AnswerValue,
    ) -> Result<Option<FinalizedAnswer>, OracleError> {
        trace!(round_id = %request.round_id, provider = %request.provider, value = %value, "response recorded");
        self.events.emit(OracleEvent::ResponseReceived {
            value,
            round_id: request.round_id,
            source: request.provider.clone(),
        });
        self.try_finalize(state)
    }

    fn on_cancel(&self, state: &RoundState, request_id: RequestId) {
        self.events.emit(OracleEvent::RequestCancelled { request_id, round_id: state.round_id() });
        self.metrics.record_cancelled();
    }

    fn on_purge(&self, state: &RoundState) {
        let finalized = state.is_finalized();
        if !finalized {
            if let Some(action_id) = state.action() {
                if self.actions.discard(action_id) {
                    debug!(round_id = %state.round_id(), action_id = %action_id, "unfired action discarded");
                }
            }
        }
        self.events.emit(OracleEvent::RoundPurged { round_id: state.round_id(), finalized });
        self.metrics.record_purged(finalized);
        self.metrics.record_open_rounds(self.registry.open_rounds());
    }
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
