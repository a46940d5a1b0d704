use super::types::RequestId;
use thiserror::Error;

/// Errors returned by the aggregation engine.
///
/// Handling differs per variant:
/// - `Config` is fatal to the call that supplied the parameters
/// - `UnknownRequest` is expected under duplicate or late delivery and is dropped
/// - `InvalidState` rejects a cancellation that would corrupt an open round
/// - `Range` is an internal invariant violation and must be surfaced loudly
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OracleError {
    /// Round parameters are inconsistent (quorum above provider count, too many providers).
    #[error("Invalid round configuration: {0}")]
    Config(String),

    /// Response or cancellation for a request id that is unknown or already resolved.
    #[error("Unknown request: {0}")]
    UnknownRequest(RequestId),

    /// Operation not permitted in the current round state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Selection rank outside `[1, len]`.
    #[error("Selection rank {k} out of range for {len} values")]
    Range { k: usize, len: usize },
}

impl OracleError {
    /// Returns `true` for errors that are part of normal asynchronous operation.
    ///
    /// Benign errors are logged at debug level and never counted as defects.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::UnknownRequest(_))
    }

    /// Returns `true` if this error indicates a broken internal invariant.
    #[must_use]
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::Range { .. })
    }

    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn as_metric_str(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::UnknownRequest(_) => "unknown_request",
            Self::InvalidState(_) => "invalid_state",
            Self::Range { .. } => "range",
        }
    }
}

/// Errors reported by an [`EffectHandler`](super::action::EffectHandler).
///
/// Any effect error is terminal for the action: it is reported and kept for
/// manual intervention, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EffectError {
    /// The effect target refused the call.
    #[error("Effect rejected: {0}")]
    Rejected(String),

    /// The call could not be delivered to the target.
    #[error("Effect transport failed: {0}")]
    Transport(String),

    /// The effect did not complete within the configured timeout.
    #[error("Effect timed out")]
    Timeout,

    /// No effect worker is running to perform the effect.
    #[error("Effect worker unavailable")]
    WorkerUnavailable,
}

/// Errors reported by a [`QueryTransport`](super::dispatcher::QueryTransport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// The transport has shut down and accepts no more queries.
    #[error("Transport closed")]
    Closed,

    /// The transport refused the query.
    #[error("Query rejected: {0}")]
    Rejected(String),
}
