//! # Oracle Core
//!
//! Core library for the quorum oracle: fan a query out to N data providers,
//! collect their asynchronous answers and derive one canonical value by integer
//! median once a quorum is reached.
//!
//! This crate provides:
//!
//! - **[`aggregation`]**: round lifecycle, median selection, request registry,
//!   provider dispatch and exactly-once follow-up actions.
//!
//! - **[`answer`]**: the canonical answer with lock-free reads and monotonic
//!   round-id updates.
//!
//! - **[`runtime`]**: engine wiring, the background effect worker and graceful
//!   shutdown.
//!
//! - **[`config`]**: layered TOML and environment configuration.
//!
//! - **[`metrics`]**: Prometheus metrics collection.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      AggregationEngine                        │
//! │  ┌────────────┐  ┌───────────────┐  ┌───────────────────────┐ │
//! │  │ Dispatcher │  │ RoundRegistry │  │    CanonicalAnswer    │ │
//! │  └─────┬──────┘  └───────┬───────┘  └───────────▲───────────┘ │
//! │        │                 │ per-round Mutex      │ commit      │
//! │        │          ┌──────▼──────┐       ┌───────┴───────┐     │
//! │        │          │ RoundState  ├──────►│ select/median │     │
//! │        │          └──────┬──────┘       └───────────────┘     │
//! │        │                 │ on finalize                        │
//! │        │          ┌──────▼─────────┐                          │
//! │        │          │ ActionExecutor │──► EffectCommand (mpsc)  │
//! │        │          └────────────────┘          │               │
//! └────────┼──────────────────────────────────────┼───────────────┘
//!          ▼                                      ▼
//!   QueryTransport                         EffectWorker ──► EffectHandler
//! ```
//!
//! ## Response Flow
//!
//! ```text
//! deliver_response(request_id, value)
//!       │
//!       ▼
//! ┌─────────────┐
//! │   resolve   │ ─── unknown / duplicate ──► UnknownRequest (dropped)
//! └──────┬──────┘
//!        │ lock round
//!        ▼
//! ┌─────────────┐
//! │   record    │
//! └──────┬──────┘
//!        ▼
//! ┌─────────────┐
//! │ try_finalize│ ─── below quorum / stale / done ──► no-op
//! └──────┬──────┘
//!        │ median, commit, fire action
//!        ▼
//! ┌─────────────┐
//! │  try_purge  │ ─── all expected in ──► round removed
//! └─────────────┘
//! ```

pub mod aggregation;
pub mod answer;
pub mod config;
pub mod metrics;
pub mod runtime;

pub use aggregation::errors::{EffectError, OracleError, TransportError};
