//! `aegis-runtime` – The Governed Decision Loop
//!
//! Wires the policy chain, the audit pipeline and the event bus into one
//! per-decision control path, and talks to the components that actually
//! produce decisions through narrow contracts.
//!
//! # Modules
//!
//! - [`contracts`] – [`AffectSource`][contracts::AffectSource],
//!   [`IdentitySource`][contracts::IdentitySource] and
//!   [`DecisionSource`][contracts::DecisionSource]: the only surface the
//!   governor needs from the affect model, the memory/planning subsystem and
//!   the decision engine.
//! - [`governor`] – [`Governor`][governor::Governor]: snapshot → trace →
//!   review → decide (only on `ALLOW`) → audit → notify.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: installs the
//!   global `tracing` subscriber with an optional OTLP span exporter.

pub mod contracts;
pub mod governor;
pub mod telemetry;

pub use contracts::{
    AffectSnapshot, AffectSource, DecisionOutcome, DecisionRequest, DecisionSource,
    IdentitySnapshot, IdentitySource, Observation,
};
pub use governor::{DecisionReport, DecisionStatus, Governor, GovernorConfig, SystemStatus};
pub use telemetry::{TracerProviderGuard, init_tracing};

// Re-exported so binaries can hold the chain, bus and store without extra
// direct dependencies.
pub use aegis_kernel::{GovernanceConfig, SelfGovernancePolicy};
pub use aegis_memory::{LocalJsonlStore, StateStore, TraceLogger};
pub use aegis_middleware::{EventBus, Subscription, topics};
