//! Per-round accumulation state.
//!
//! A [`RoundState`] collects provider answers in arrival order and decides when a
//! round may finalize. It holds no locks itself; the registry wraps each round in
//! a mutex so mutations of one round are serialized while distinct rounds proceed
//! in parallel.

use super::{
    errors::OracleError,
    select,
    types::{ActionId, AnswerValue, FinalizedAnswer, RequestId, RoundId},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::warn;

/// Outcome of evaluating whether a round may finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeDecision {
    /// Fewer responses than the quorum threshold have arrived.
    BelowQuorum { received: usize, required: usize },
    /// The round already produced its answer.
    AlreadyFinalized,
    /// A round with a higher id has already finalized.
    Stale { latest: RoundId },
    /// The round may aggregate and commit now.
    Ready,
}

/// Accumulation state for one round.
#[derive(Debug)]
pub struct RoundState {
    round_id: RoundId,
    expected_count: usize,
    quorum_threshold: usize,
    responses: Vec<AnswerValue>,
    request_ids: Vec<RequestId>,
    action: Option<ActionId>,
    finalized: Option<FinalizedAnswer>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl RoundState {
    /// Validates round parameters before any id is allocated.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Config`] if the provider set is empty or larger than
    /// `max_providers`, or if the quorum is zero or exceeds the provider count.
    pub fn check_params(
        expected_count: usize,
        quorum_threshold: usize,
        max_providers: usize,
    ) -> Result<(), OracleError> {
        if expected_count == 0 {
            return Err(OracleError::Config("round needs at least one provider".to_string()));
        }
        if expected_count > max_providers {
            return Err(OracleError::Config(format!(
                "{expected_count} providers exceeds maximum of {max_providers}"
            )));
        }
        if quorum_threshold == 0 {
            return Err(OracleError::Config("quorum threshold must be at least 1".to_string()));
        }
        if quorum_threshold > expected_count {
            return Err(OracleError::Config(format!(
                "quorum {quorum_threshold} exceeds {expected_count} providers"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn new(
        round_id: RoundId,
        expected_count: usize,
        quorum_threshold: usize,
        request_ids: Vec<RequestId>,
        action: Option<ActionId>,
    ) -> Self {
        Self {
            round_id,
            expected_count,
            quorum_threshold,
            responses: Vec::with_capacity(expected_count),
            request_ids,
            action,
            finalized: None,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Appends a response in arrival order.
    ///
    /// Returns `false` and leaves the round untouched if it already holds
    /// `expected_count` responses.
    pub fn record_response(&mut self, value: AnswerValue) -> bool {
        if self.responses.len() >= self.expected_count {
            warn!(
                round_id = %self.round_id,
                expected = self.expected_count,
                "response beyond expected count ignored"
            );
            return false;
        }
        self.responses.push(value);
        true
    }

    /// Decides whether this round may finalize given the latest finalized round.
    #[must_use]
    pub fn evaluate_finalize(&self, latest_finalized: RoundId) -> FinalizeDecision {
        if self.finalized.is_some() {
            return FinalizeDecision::AlreadyFinalized;
        }
        if self.responses.len() < self.quorum_threshold {
            return FinalizeDecision::BelowQuorum {
                received: self.responses.len(),
                required: self.quorum_threshold,
            };
        }
        if self.round_id < latest_finalized {
            return FinalizeDecision::Stale { latest: latest_finalized };
        }
        FinalizeDecision::Ready
    }

    /// Median of the responses received so far.
    ///
    /// # Errors
    ///
    /// Returns [`OracleError::Range`] if no responses have been recorded.
    pub fn aggregate(&self) -> Result<AnswerValue, OracleError> {
        select::median(&self.responses)
    }

    pub fn mark_finalized(&mut self, answer: FinalizedAnswer) {
        self.finalized = Some(answer);
    }

    /// A round is complete once every expected response has been recorded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.responses.len() == self.expected_count
    }

    #[must_use]
    pub fn round_id(&self) -> RoundId {
        self.round_id
    }

    #[must_use]
    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    #[must_use]
    pub fn quorum_threshold(&self) -> usize {
        self.quorum_threshold
    }

    #[must_use]
    pub fn responses(&self) -> &[AnswerValue] {
        &self.responses
    }

    #[must_use]
    pub fn received(&self) -> usize {
        self.responses.len()
    }

    #[must_use]
    pub fn request_ids(&self) -> &[RequestId] {
        &self.request_ids
    }

    #[must_use]
    pub fn action(&self) -> Option<ActionId> {
        self.action
    }

    #[must_use]
    pub fn finalized(&self) -> Option<FinalizedAnswer> {
        self.finalized
    }

    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    /// Wall-clock time since the round was opened.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            round_id: self.round_id,
            expected_count: self.expected_count,
            quorum_threshold: self.quorum_threshold,
            received: self.responses.len(),
            finalized: self.finalized,
            has_action: self.action.is_some(),
            started_at: self.started_at,
        }
    }
}

/// Serializable view of an open round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundSnapshot {
    pub round_id: RoundId,
    pub expected_count: usize,
    pub quorum_threshold: usize,
    pub received: usize,
    pub finalized: Option<FinalizedAnswer>,
    pub has_action: bool,
    pub started_at: DateTime<Utc>,
}
