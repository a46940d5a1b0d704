//! Oracle runtime initialization and lifecycle management.
//!
//! The runtime wires an [`AggregationEngine`](crate::aggregation::AggregationEngine)
//! to a caller-supplied query transport and runs the background effect worker
//! that executes fired actions.
//!
//! # Example
//!
//! ```no_run
//! use oracle_core::{
//!     aggregation::{OutboundQuery, QueryTransport, TransportError},
//!     config::AppConfig,
//!     runtime::OracleRuntime,
//! };
//! use std::sync::Arc;
//!
//! struct Queue;
//!
//! impl QueryTransport for Queue {
//!     fn emit_query(&self, query: OutboundQuery) -> Result<(), TransportError> {
//!         // hand the query to the provider, deliver its answer later
//!         let _ = query;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = OracleRuntime::builder()
//!         .with_config(AppConfig::load()?)
//!         .with_transport(Arc::new(Queue))
//!         .build()?;
//!
//!     runtime.start_configured_round(serde_json::json!({"pair": "BTC/USD"}), None)?;
//!
//!     runtime.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod effects;
pub mod lifecycle;

pub use builder::{OracleRuntimeBuilder, RuntimeError};
pub use effects::{EffectWorker, LoggingEffectHandler};
pub use lifecycle::OracleRuntime;
