//! Round registry: request-to-round and round-to-state mappings.
//!
//! Both maps are sharded `DashMap`s so unrelated rounds never contend. Each
//! round lives behind its own `Mutex`; every mutation of a round (recording,
//! finalizing, purging) happens inside one critical section on that mutex.
//!
//! Lock order is round mutex first, then map shards. Map guards are never held
//! while waiting on a round mutex: lookups clone the `Arc` and release the shard
//! before locking.

use super::{
    errors::OracleError,
    round::{RoundSnapshot, RoundState},
    types::{AnswerValue, FinalizedAnswer, ProviderRef, RequestId, RoundId, CANCELLED_SENTINEL},
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

/// A provider-bound query that has not been answered yet.
#[derive(Debug, Clone)]
pub struct OutstandingRequest {
    pub round_id: RoundId,
    pub provider: ProviderRef,
}

/// Result of delivering one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The response was appended to its round.
    Recorded {
        round_id: RoundId,
        received: usize,
        /// Set if this response caused the round to finalize.
        finalized: Option<FinalizedAnswer>,
        purged: bool,
    },
    /// The request was known but its round no longer accepts responses.
    Dropped { round_id: RoundId },
}

/// Result of a successful cancellation.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub round_id: RoundId,
    pub provider: ProviderRef,
    /// Whether recording the sentinel completed and purged the round.
    pub purged: bool,
}

/// Callbacks run inside a round's critical section.
pub(crate) trait RoundHooks {
    /// Called after a response has been appended. Returns the answer if the
    /// round finalized as a result.
    fn on_response(
        &self,
        state: &mut RoundState,
        request: &OutstandingRequest,
        value: AnswerValue,
    ) -> Result<Option<FinalizedAnswer>, OracleError>;

    /// Called after a cancellation sentinel has been appended.
    fn on_cancel(&self, state: &RoundState, request_id: RequestId);

    /// Called once when a completed round is removed.
    fn on_purge(&self, state: &RoundState);
}

#[derive(Debug, Default)]
pub struct RoundRegistry {
    requests: DashMap<RequestId, OutstandingRequest>,
    rounds: DashMap<RoundId, Arc<Mutex<RoundState>>>,
}

impl RoundRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a freshly created round and returns its shared handle.
    pub fn register_round(&self, state: RoundState) -> Arc<Mutex<RoundState>> {
        let round_id = state.round_id();
        let round = Arc::new(Mutex::new(state));
        self.rounds.insert(round_id, Arc::clone(&round));
        trace!(round_id = %round_id, "round registered");
        round
    }

    pub fn register_request(&self, request_id: RequestId, request: OutstandingRequest) {
        self.requests.insert(request_id, request);
    }

    /// Removes and returns the mapping for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::UnknownRequest`] if the id was never registered or
    /// has already been resolved, cancelled or purged.
    pub fn resolve(&self, request_id: RequestId) -> Result<OutstandingRequest, OracleError> {
        self.requests
            .remove(&request_id)
            .map(|(_, request)| request)
            .ok_or(OracleError::UnknownRequest(request_id))
    }

    /// Looks up an outstanding request without resolving it.
    #[must_use]
    pub fn peek(&self, request_id: RequestId) -> Option<OutstandingRequest> {
        self.requests.get(&request_id).map(|entry| entry.value().clone())
    }

    /// Shared handle to a live round.
    #[must_use]
    pub fn round(&self, round_id: RoundId) -> Option<Arc<Mutex<RoundState>>> {
        self.rounds.get(&round_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Resolves `request_id`, appends `value` to its round and runs the
    /// finalize/purge hooks, all under the round's lock.
    ///
    /// The round is purged even if the finalize hook fails.
    pub(crate) fn resolve_and_record(
        &self,
        request_id: RequestId,
        value: AnswerValue,
        hooks: &impl RoundHooks,
    ) -> Result<DeliveryOutcome, OracleError> {
        let request = self.resolve(request_id)?;
        let round_id = request.round_id;

        let Some(round) = self.round(round_id) else {
            debug!(request_id = %request_id, round_id = %round_id, "response for purged round dropped");
            return Ok(DeliveryOutcome::Dropped { round_id });
        };

        let mut state = round.lock();
        if !state.record_response(value) {
            return Ok(DeliveryOutcome::Dropped { round_id });
        }

        let finalized = hooks.on_response(&mut state, &request, value);
        let purged = self.try_purge(&state, hooks);
        let finalized = finalized?;

        Ok(DeliveryOutcome::Recorded { round_id, received: state.received(), finalized, purged })
    }

    /// Cancels an outstanding request of a round older than `latest_finalized`.
    ///
    /// Records [`CANCELLED_SENTINEL`] in place of the missing response so the
    /// round can still complete and be purged.
    ///
    /// # Errors
    ///
    /// - [`OracleError::UnknownRequest`] if the request is not outstanding
    /// - [`OracleError::InvalidState`] if the owning round is not strictly older
    ///   than the latest finalized round
    pub(crate) fn cancel(
        &self,
        request_id: RequestId,
        latest_finalized: RoundId,
        hooks: &impl RoundHooks,
    ) -> Result<CancelOutcome, OracleError> {
        let round_id = self
            .requests
            .get(&request_id)
            .map(|entry| entry.round_id)
            .ok_or(OracleError::UnknownRequest(request_id))?;

        if round_id >= latest_finalized {
            return Err(OracleError::InvalidState(format!(
                "round {round_id} is not older than latest finalized round {latest_finalized}"
            )));
        }

        let request = self.resolve(request_id)?;
        let Some(round) = self.round(round_id) else {
            return Ok(CancelOutcome { round_id, provider: request.provider, purged: false });
        };

        let mut state = round.lock();
        let purged = if state.record_response(CANCELLED_SENTINEL) {
            hooks.on_cancel(&state, request_id);
            self.try_purge(&state, hooks)
        } else {
            false
        };
        drop(state);

        Ok(CancelOutcome { round_id, provider: request.provider, purged })
    }

    /// Removes a completed round. Caller must hold the round's lock.
    fn try_purge(&self, state: &RoundState, hooks: &impl RoundHooks) -> bool {
        if !state.is_complete() {
            return false;
        }
        if self.rounds.remove(&state.round_id()).is_none() {
            return false;
        }
        for request_id in state.request_ids() {
            self.requests.remove(request_id);
        }
        hooks.on_purge(state);
        debug!(round_id = %state.round_id(), "round purged");
        true
    }

    /// Unconditionally removes a round and its leftover request mappings.
    ///
    /// Idempotent: returns `false` if the round was already gone.
    pub fn purge(&self, round_id: RoundId) -> bool {
        let Some((_, round)) = self.rounds.remove(&round_id) else {
            return false;
        };
        let state = round.lock();
        for request_id in state.request_ids() {
            self.requests.remove(request_id);
        }
        true
    }

    #[must_use]
    pub fn open_rounds(&self) -> usize {
        self.rounds.len()
    }

    #[must_use]
    pub fn outstanding_requests(&self) -> usize {
        self.requests.len()
    }

    #[must_use]
    pub fn round_snapshot(&self, round_id: RoundId) -> Option<RoundSnapshot> {
        let round = self.round(round_id)?;
        let snapshot = round.lock().snapshot();
        Some(snapshot)
    }
}
