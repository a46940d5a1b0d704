//! Canonical answer tracking.
//!
//! `CanonicalAnswer` is the single process-wide result of aggregation: the value
//! of the freshest finalized round. Readers load it lock-free; writers serialize
//! through one mutex that also owns the per-round history.

use crate::aggregation::types::{AnswerValue, RoundId};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{debug, trace};

/// Point-in-time view of the canonical answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnswerSnapshot {
    pub value: AnswerValue,
    pub round_id: RoundId,
    /// Finalization sequence height; 0 until the first round finalizes.
    pub finalized_at: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for AnswerSnapshot {
    fn default() -> Self {
        Self { value: 0, round_id: RoundId::ZERO, finalized_at: 0, updated_at: None }
    }
}

#[derive(Debug)]
struct WriteSection {
    sequence: u64,
    history: BTreeMap<RoundId, AnswerSnapshot>,
}

/// The canonical answer owned by one engine instance.
///
/// # Thread Safety
///
/// `snapshot()` and the other getters are wait-free loads from an `ArcSwap`.
/// `commit()` takes the write mutex, re-checks round-id monotonicity against the
/// current snapshot and only then publishes, so a reordered commit of an older
/// round can never regress the answer.
#[derive(Debug)]
pub struct CanonicalAnswer {
    current: ArcSwap<AnswerSnapshot>,
    write: Mutex<WriteSection>,
    history_capacity: usize,
}

impl CanonicalAnswer {
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        Self {
            current: ArcSwap::from_pointee(AnswerSnapshot::default()),
            write: Mutex::new(WriteSection { sequence: 0, history: BTreeMap::new() }),
            history_capacity: history_capacity.max(1),
        }
    }

    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> AnswerSnapshot {
        **self.current.load()
    }

    #[inline]
    #[must_use]
    pub fn current_value(&self) -> AnswerValue {
        self.current.load().value
    }

    /// Id of the freshest finalized round, or [`RoundId::ZERO`] if none.
    #[inline]
    #[must_use]
    pub fn latest_round(&self) -> RoundId {
        self.current.load().round_id
    }

    #[inline]
    #[must_use]
    pub fn finalized_at(&self) -> u64 {
        self.current.load().finalized_at
    }

    /// Answer a specific round finalized with, if it is still in the history.
    #[must_use]
    pub fn answer_for(&self, round_id: RoundId) -> Option<AnswerSnapshot> {
        self.write.lock().history.get(&round_id).copied()
    }

    /// Publishes `value` as the answer of `round_id`.
    ///
    /// Returns the new snapshot, or `None` if a fresher round has already
    /// committed.
    pub fn commit(&self, round_id: RoundId, value: AnswerValue) -> Option<AnswerSnapshot> {
        let mut section = self.write.lock();

        let current = self.snapshot();
        if round_id < current.round_id {
            debug!(
                round_id = %round_id,
                latest = %current.round_id,
                "commit superseded by fresher round"
            );
            return None;
        }

        section.sequence += 1;
        let snapshot = AnswerSnapshot {
            value,
            round_id,
            finalized_at: section.sequence,
            updated_at: Some(Utc::now()),
        };

        section.history.insert(round_id, snapshot);
        while section.history.len() > self.history_capacity {
            section.history.pop_first();
        }

        self.current.store(Arc::new(snapshot));
        trace!(round_id = %round_id, value = %value, "canonical answer updated");
        Some(snapshot)
    }

    #[must_use]
    pub fn history_len(&self) -> usize {
        self.write.lock().history.len()
    }
}

impl Default for CanonicalAnswer {
    fn default() -> Self {
        Self::new(1024)
    }
}
