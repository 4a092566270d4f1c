//! `aegis-memory` – The Audit Trail.
//!
//! Durable, process-independent persistence for the governance layer, rooted
//! at one base directory on the local filesystem.
//!
//! # Modules
//!
//! - [`state_store`] – the [`StateStore`][state_store::StateStore] contract
//!   and [`LocalJsonlStore`][state_store::LocalJsonlStore]: write-through keyed
//!   values, append-only JSON Lines streams, and size-triggered gzip rotation.
//! - [`trace_logger`] – [`TraceLogger`][trace_logger::TraceLogger]: a
//!   single-consumer FIFO queue that writes every
//!   [`DecisionTrace`][aegis_types::DecisionTrace] to a stream and drains on
//!   shutdown.

pub mod state_store;
pub mod trace_logger;

pub use state_store::{LocalJsonlStore, StateStore};
pub use trace_logger::{DEFAULT_TRACE_LOG, TraceLogger};
