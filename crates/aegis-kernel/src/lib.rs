//! `aegis-kernel` – Self-Governance Policy Chain
//!
//! Does not decide anything itself; it reviews decisions other components
//! propose and returns a [`PolicyVerdict`][aegis_types::PolicyVerdict].
//!
//! # Modules
//!
//! - [`policy`] – the [`Policy`][policy::Policy] trait every rule evaluator
//!   implements.
//! - [`maturity_gate`] – [`MaturityGatePolicy`][maturity_gate::MaturityGatePolicy]:
//!   classifies the goal into a category with a data-driven
//!   [`GoalClassifier`][maturity_gate::GoalClassifier] and denies decisions
//!   whose category requires more maturity than the agent has.
//! - [`mental_health`] – [`MentalHealthPolicy`][mental_health::MentalHealthPolicy]:
//!   warns at the risk threshold, denies at the critical threshold.
//! - [`pmx_boundary`] – [`PmxBoundaryPolicy`][pmx_boundary::PmxBoundaryPolicy]:
//!   conditions decisions taken while an emotion exceeds its limit.
//! - [`self_governance`] – [`SelfGovernancePolicy`][self_governance::SelfGovernancePolicy]:
//!   the fixed, short-circuiting chain of the three policies above.
//! - [`config`] – [`GovernanceConfig`][config::GovernanceConfig]: serde-loadable
//!   thresholds and limits for the chain.

pub mod config;
pub mod maturity_gate;
pub mod mental_health;
pub mod pmx_boundary;
pub mod policy;
pub mod self_governance;

pub use config::GovernanceConfig;
pub use maturity_gate::{CategoryRule, GENERAL_CATEGORY, GoalClassifier, MaturityGatePolicy};
pub use mental_health::MentalHealthPolicy;
pub use pmx_boundary::PmxBoundaryPolicy;
pub use policy::Policy;
pub use self_governance::SelfGovernancePolicy;
