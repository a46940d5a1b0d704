//! # Aggregation Overview
//!
//! A round fans one query out to N providers and turns their asynchronous
//! answers into a single canonical value.
//!
//! ## Round Lifecycle
//!
//! 1. **Dispatch**: validate parameters, allocate the next round id, register
//!    one request per provider, then emit the queries
//! 2. **Accumulate**: each response resolves its request id (single use) and is
//!    appended to the round in arrival order
//! 3. **Finalize**: on the response that reaches quorum, if no fresher round
//!    has finalized, the integer median of all responses present is committed
//!    as the canonical answer and the round's action fires
//! 4. **Purge**: once every expected response (or cancellation sentinel) is in,
//!    the round and its request mappings are removed
//!
//! A round finalizes at most once, at first quorum. Responses arriving later
//! are still recorded for purge bookkeeping but never change the answer.
//!
//! ## Failure Modes
//!
//! - **Late or duplicate response**: `UnknownRequest`, dropped and logged at debug
//! - **Quorum never reached**: the round stays open until its requests are
//!   cancelled with an expiry proof after a fresher round finalized
//! - **Effect failure**: reported as `ActionFailed`, kept for manual handling,
//!   never retried and never rolls back the answer
//!
//! # Module Organization
//!
//! - [`select`]: order statistic and integer median
//! - [`round`]: per-round accumulation and finalize gates
//! - [`registry`]: request and round maps, purge and cancel
//! - [`dispatcher`]: provider fan-out through [`QueryTransport`]
//! - [`action`]: exactly-once follow-up actions and [`EffectHandler`]
//! - [`engine`][]: orchestration (`AggregationEngine`, main entry point)

pub mod action;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod events;
pub mod registry;
pub mod round;
pub mod select;
pub mod types;


pub use action::{ActionExecutor, ActionRecord, ActionState, EffectCommand, EffectHandler};
pub use config::EngineConfig;
pub use dispatcher::{DispatchSummary, QueryTransport};
pub use engine::{AggregationEngine, EngineStats};
pub use errors::{EffectError, OracleError, TransportError};
pub use events::{EventBus, OracleEvent};
pub use registry::{CancelOutcome, DeliveryOutcome, OutstandingRequest};
pub use round::{FinalizeDecision, RoundSnapshot};
pub use types::{
    Action, ActionId, AnswerValue, ExpiryProof, FinalizedAnswer, OutboundQuery, ProviderRef,
    RequestId, RoundId, RoundRequest, CANCELLED_SENTINEL,
};
