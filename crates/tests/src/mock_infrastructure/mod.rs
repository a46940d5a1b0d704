//! Mock Infrastructure for Testing the Quorum Oracle
//!
//! Provider answers never travel over a network in these tests. The
//! [`RecordingTransport`] keeps every emitted query so a test can deliver
//! answers by hand, in whatever order and timing it needs.
//!
//! ## Components
//!
//! - `RecordingTransport`: captures outbound queries, optionally rejecting some providers
//! - `ScriptedEffectHandler`: effect handler with scripted outcomes and delays
//! - Test helpers for building engines and provider sets
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{create_engine, providers};
//!
//! let (engine, transport, _effects) = create_engine();
//! let round_id = engine.start_round(RoundRequest::new(providers(5), 3))?;
//! for request_id in transport.request_ids(round_id) {
//!     engine.deliver_response(request_id, 42)?;
//! }
//! ```

pub mod effect_handler;
pub mod test_helpers;

pub use effect_handler::{EffectCall, ScriptedEffectHandler};
pub use test_helpers::*;
pub use transport::RecordingTransport;
