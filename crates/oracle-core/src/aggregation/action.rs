//! Follow-up actions fired once per finalized round.
//!
//! The executor only decides. [`ActionExecutor::on_finalize`] turns a queued
//! action into an [`EffectCommand`] at most once; performing the effect is left
//! to an [`EffectHandler`] driven by the runtime, which reports back through
//! [`ActionExecutor::complete`].
//!
//! ```text
//! Queued ──on_finalize──▶ Dispatched ──complete(Ok)──▶ Executed (retired)
//!    │                        └───────complete(Err)──▶ Failed (kept, never retried)
//!    └──discard (round purged unfinalized)
//! ```

use super::{
    errors::EffectError,
    events::{EventBus, OracleEvent},
    types::{Action, ActionId, RoundId},
};
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Performs the external effect of a fired action.
#[async_trait]
pub trait EffectHandler: Send + Sync {
    /// # Errors
    ///
    /// Returns an [`EffectError`] if the effect did not take place. The action is
    /// then marked failed and never retried.
    async fn perform(&self, target: &str, payload: &serde_json::Value) -> Result<(), EffectError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionState {
    Queued,
    Dispatched,
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub round_id: RoundId,
    pub action: Action,
    /// Flips to `true` exactly once, after the effect reported success.
    pub executed: bool,
    pub state: ActionState,
}

/// A fired action on its way to the effect worker.
#[derive(Debug, Clone)]
pub struct EffectCommand {
    pub action_id: ActionId,
    pub round_id: RoundId,
    pub target: String,
    pub payload: serde_json::Value,
}

#[derive(Debug)]
pub struct ActionExecutor {
    slots: DashMap<ActionId, ActionRecord>,
    next_id: AtomicU64,
    events: EventBus,
}

impl ActionExecutor {
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self { slots: DashMap::new(), next_id: AtomicU64::new(1), events }
    }

    /// Stores `action` for `round_id` until the round finalizes.
    pub fn queue(&self, round_id: RoundId, action: Action) -> ActionId {
        let action_id = ActionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.slots.insert(
            action_id,
            ActionRecord { round_id, action, executed: false, state: ActionState::Queued },
        );
        debug!(round_id = %round_id, action_id = %action_id, "action queued");
        action_id
    }

    /// Fires the action if it is still queued.
    ///
    /// The `Queued -> Dispatched` transition happens under the slot's shard
    /// lock, so concurrent callers for the same action get exactly one command.
    pub fn on_finalize(&self, round_id: RoundId, action_id: ActionId) -> Option<EffectCommand> {
        let mut record = self.slots.get_mut(&action_id)?;
        if record.state != ActionState::Queued || record.executed {
            debug!(round_id = %round_id, action_id = %action_id, "action already fired");
            return None;
        }
        record.state = ActionState::Dispatched;

        Some(EffectCommand {
            action_id,
            round_id,
            target: record.action.target.clone(),
            payload: record.action.payload.clone(),
        })
    }

    /// Records the outcome of a dispatched action.
    ///
    /// Success retires the slot and returns its final record. Failure keeps the
    /// slot in the failed set. Outcomes for actions that are not dispatched are
    /// ignored.
    pub fn complete(
        &self,
        action_id: ActionId,
        result: Result<(), EffectError>,
    ) -> Option<ActionRecord> {
        let Entry::Occupied(mut slot) = self.slots.entry(action_id) else {
            warn!(action_id = %action_id, "completion for unknown action ignored");
            return None;
        };
        if slot.get().state != ActionState::Dispatched {
            warn!(action_id = %action_id, state = ?slot.get().state, "completion for action not in flight ignored");
            return None;
        }

        let round_id = slot.get().round_id;
        match result {
            Ok(()) => {
                let mut record = slot.remove();
                record.executed = true;
                info!(round_id = %round_id, action_id = %action_id, "action executed");
                self.events.emit(OracleEvent::ActionSucceeded { round_id });
                Some(record)
            }
            Err(e) => {
                let reason = e.to_string();
                slot.get_mut().state = ActionState::Failed { reason: reason.clone() };
                let record = slot.get().clone();
                drop(slot);
                warn!(round_id = %round_id, action_id = %action_id, error = %reason, "action failed");
                self.events.emit(OracleEvent::ActionFailed { round_id, reason });
                Some(record)
            }
        }
    }

    /// Drops an action that can no longer fire. Only queued actions are removed.
    pub fn discard(&self, action_id: ActionId) -> bool {
        self.slots.remove_if(&action_id, |_, record| record.state == ActionState::Queued).is_some()
    }

    #[must_use]
    pub fn get(&self, action_id: ActionId) -> Option<ActionRecord> {
        self.slots.get(&action_id).map(|entry| entry.value().clone())
    }

    /// Actions whose effect failed, awaiting manual intervention.
    #[must_use]
    pub fn failed_actions(&self) -> Vec<(ActionId, ActionRecord)> {
        let mut failed: Vec<_> = self
            .slots
            .iter()
            .filter(|entry| matches!(entry.state, ActionState::Failed { .. }))
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        failed.sort_by_key(|(action_id, _)| *action_id);
        failed
    }

    /// Removes a failed action once it has been handled externally.
    pub fn take_failed(&self, action_id: ActionId) -> Option<ActionRecord> {
        self.slots
            .remove_if(&action_id, |_, record| matches!(record.state, ActionState::Failed { .. }))
            .map(|(_, record)| record)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.slots.len()
    }
}
