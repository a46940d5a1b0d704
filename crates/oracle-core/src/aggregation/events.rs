//! Signals emitted by the aggregation engine.
//!
//! Events for one round are emitted while that round's lock is held, so a
//! subscriber always observes them in round order: `ResponseReceived` before
//! the `AnswerUpdated` it caused, and `RoundPurged` last.

use super::types::{AnswerValue, ProviderRef, RequestId, RoundId};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleEvent {
    RoundStarted {
        round_id: RoundId,
        expected_count: usize,
        quorum_threshold: usize,
    },
    ResponseReceived {
        value: AnswerValue,
        round_id: RoundId,
        source: ProviderRef,
    },
    AnswerUpdated {
        value: AnswerValue,
        round_id: RoundId,
        finalized_at: u64,
    },
    ActionSucceeded {
        round_id: RoundId,
    },
    ActionFailed {
        round_id: RoundId,
        reason: String,
    },
    RoundPurged {
        round_id: RoundId,
        finalized: bool,
    },
    RequestCancelled {
        request_id: RequestId,
        round_id: RoundId,
    },
}

impl OracleEvent {
    /// Round the event belongs to.
    #[must_use]
    pub fn round_id(&self) -> RoundId {
        match self {
            Self::RoundStarted { round_id, .. }
            | Self::ResponseReceived { round_id, .. }
            | Self::AnswerUpdated { round_id, .. }
            | Self::ActionSucceeded { round_id }
            | Self::ActionFailed { round_id, .. }
            | Self::RoundPurged { round_id, .. }
            | Self::RequestCancelled { round_id, .. } => *round_id,
        }
    }
}

/// Broadcast fan-out of [`OracleEvent`]s.
///
/// Emitting never blocks and never fails: with no subscribers the event is
/// dropped, and slow subscribers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<OracleEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OracleEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: OracleEvent) {
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
