//! `aegis-middleware` – Notification Fan-out
//!
//! Tells external observers what the governance layer is doing without
//! caring what they do with it.  Delivery is best-effort: the audit trail in
//! `aegis-memory` is the durable record, the bus is not.
//!
//! # Modules
//!
//! - [`bus`] – Topic-addressed publish/subscribe [`EventBus`] with an explicit
//!   `start`/`stop` lifecycle and [`Subscription`] streams.

pub mod bus;

pub use bus::{EventBus, Subscription, topics};
