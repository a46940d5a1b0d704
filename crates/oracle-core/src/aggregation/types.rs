//! Identifiers and value types shared by the aggregation components.

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use uuid::Uuid;

/// A provider-reported numeric answer.
///
/// Answers are non-negative integers; aggregation never uses floating point so
/// independent re-execution produces bit-identical results.
pub type AnswerValue = u128;

/// Sentinel recorded into a round when one of its requests is cancelled.
///
/// Keeps the response count in step with the number of resolved requests so the
/// round can still be purged.
pub const CANCELLED_SENTINEL: AnswerValue = 0;

/// Identifier of one aggregation round.
///
/// Assigned in strictly increasing order by the engine, starting at 1. The value
/// 0 never names a round and is used as the "nothing finalized yet" marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(u64);

impl RoundId {
    /// Marker for "no round finalized yet".
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single provider-bound query in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a fresh random request id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a queued follow-up action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(u64);

impl ActionId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a data provider, as resolved by the external provider registry.
///
/// The engine never interprets `endpoint`; it is handed back to the transport
/// untouched on every outbound query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderRef {
    pub name: Arc<str>,
    pub endpoint: Arc<str>,
}

impl ProviderRef {
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, endpoint: impl Into<Arc<str>>) -> Self {
        Self { name: name.into(), endpoint: endpoint.into() }
    }
}

impl fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One provider-bound query emitted by the dispatcher.
///
/// The transport must deliver the provider's answer back to the engine under
/// `request_id`.
#[derive(Debug, Clone)]
pub struct OutboundQuery {
    pub provider: ProviderRef,
    pub request_id: RequestId,
    pub round_id: RoundId,
    pub payload: Arc<serde_json::Value>,
}

/// A follow-up effect requested alongside a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Opaque effect target understood by the [`EffectHandler`](super::action::EffectHandler).
    pub target: String,
    /// Arguments for the effect.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Action {
    #[must_use]
    pub fn new(target: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { target: target.into(), payload }
    }
}

/// Parameters for starting a round.
///
/// The expected response count is the number of providers; the quorum threshold
/// must not exceed it.
#[derive(Debug, Clone)]
pub struct RoundRequest {
    pub providers: Vec<ProviderRef>,
    pub quorum_threshold: usize,
    pub query: serde_json::Value,
    pub action: Option<Action>,
}

impl RoundRequest {
    #[must_use]
    pub fn new(providers: Vec<ProviderRef>, quorum_threshold: usize) -> Self {
        Self { providers, quorum_threshold, query: serde_json::Value::Null, action: None }
    }

    #[must_use]
    pub fn with_query(mut self, query: serde_json::Value) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Number of responses the round will wait for.
    #[must_use]
    pub fn expected_count(&self) -> usize {
        self.providers.len()
    }
}

/// The answer a round produced when it finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedAnswer {
    pub value: AnswerValue,
    /// Engine-wide finalization sequence height at which this answer committed.
    pub finalized_at: u64,
    /// Number of responses the median was computed over.
    pub response_count: usize,
}

/// Proof supplied by the external collaborator that a request has expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryProof {
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl ExpiryProof {
    #[must_use]
    pub fn new(expires_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self { expires_at }
    }

    /// A proof that expired at the current instant.
    #[must_use]
    pub fn now() -> Self {
        Self { expires_at: chrono::Utc::now() }
    }
}
