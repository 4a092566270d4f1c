//! [`SelfGovernancePolicy`] – the ordered governance chain.
//!
//! Policies are evaluated strictly in order:
//!
//! 1. [`MaturityGatePolicy`]
//! 2. [`MentalHealthPolicy`]
//! 3. [`PmxBoundaryPolicy`]
//!
//! A `DENY` stops the chain immediately; later policies are never invoked.
//! `WARN` and `CONDITION` verdicts are merged into an accumulator and the
//! chain continues.  The merged verdict carries:
//!
//! - the most severe action seen (`DENY > CONDITION > WARN > ALLOW`),
//! - the union of every raised flag and every imposed condition,
//! - the message of the first policy that produced that most severe action.
//!
//! # Example
//!
//! ```
//! use aegis_kernel::SelfGovernancePolicy;
//! use aegis_types::{DecisionTrace, PolicyAction, PolicyFlag};
//!
//! let chain = SelfGovernancePolicy::default();
//! let trace = DecisionTrace::builder("Access system root privileges")
//!     .maturity_level(5)
//!     .mental_health(0.1)
//!     .emotion("anger", 0.9)
//!     .build()
//!     .unwrap();
//!
//! // The maturity gate denies first; the other policies never run.
//! let verdict = chain.review(&trace);
//! assert_eq!(verdict.action, PolicyAction::Deny);
//! assert!(verdict.flags.contains(&PolicyFlag::MaturityGate));
//! assert!(!verdict.flags.contains(&PolicyFlag::MentalHealthRisk));
//! ```

use std::collections::BTreeSet;

use aegis_types::{AegisError, DecisionTrace, JsonMap, PolicyAction, PolicyFlag, PolicyVerdict};
use tracing::{debug, info};

use crate::config::GovernanceConfig;
use crate::maturity_gate::MaturityGatePolicy;
use crate::mental_health::MentalHealthPolicy;
use crate::pmx_boundary::PmxBoundaryPolicy;
use crate::policy::Policy;

const ALL_PASSED: &str = "All governance policies passed";

/// Fixed, short-circuiting composition of governance policies.
pub struct SelfGovernancePolicy {
    policies: Vec<Box<dyn Policy>>,
}

impl SelfGovernancePolicy {
    /// The stock chain: maturity gate, then mental health, then affect
    /// boundaries.
    pub fn new(
        maturity_gate: MaturityGatePolicy,
        mental_health: MentalHealthPolicy,
        pmx_boundary: PmxBoundaryPolicy,
    ) -> Self {
        Self::with_policies(vec![
            Box::new(maturity_gate),
            Box::new(mental_health),
            Box::new(pmx_boundary),
        ])
    }

    /// Build the stock chain from configuration.
    ///
    /// # Errors
    ///
    /// [`AegisError::Configuration`] if any threshold or limit is invalid.
    pub fn from_config(config: &GovernanceConfig) -> Result<Self, AegisError> {
        Ok(Self::new(
            MaturityGatePolicy::new(config.maturity_thresholds.clone())?,
            MentalHealthPolicy::new(config.risk_threshold, config.critical_threshold)?,
            PmxBoundaryPolicy::new(config.affect_limits.clone())?,
        ))
    }

    /// A chain over arbitrary policies, evaluated in the given order.
    pub fn with_policies(policies: Vec<Box<dyn Policy>>) -> Self {
        Self { policies }
    }

    /// Names of the chained policies in evaluation order.
    pub fn policy_names(&self) -> Vec<&str> {
        self.policies.iter().map(|p| p.name()).collect()
    }

    /// Evaluate `trace` against the chain and return the merged verdict.
    pub fn review(&self, trace: &DecisionTrace) -> PolicyVerdict {
        let mut merged = Accumulator::default();

        for policy in &self.policies {
            let verdict = policy.review(trace);
            debug!(
                trace_id = %trace.trace_id,
                policy = policy.name(),
                action = %verdict.action,
                "policy reviewed trace"
            );
            let denied = verdict.action == PolicyAction::Deny;
            merged.absorb(verdict);
            if denied {
                info!(trace_id = %trace.trace_id, policy = policy.name(), "decision denied");
                break;
            }
        }

        merged.into_verdict()
    }
}

impl Default for SelfGovernancePolicy {
    fn default() -> Self {
        Self::new(
            MaturityGatePolicy::default(),
            MentalHealthPolicy::default(),
            PmxBoundaryPolicy::default(),
        )
    }
}

impl Policy for SelfGovernancePolicy {
    fn name(&self) -> &str {
        "self_governance"
    }

    fn review(&self, trace: &DecisionTrace) -> PolicyVerdict {
        SelfGovernancePolicy::review(self, trace)
    }
}

#[derive(Default)]
struct Accumulator {
    action: Option<PolicyAction>,
    message: Option<String>,
    flags: BTreeSet<PolicyFlag>,
    conditions: Option<JsonMap>,
}

impl Accumulator {
    fn absorb(&mut self, verdict: PolicyVerdict) {
        if verdict.action == PolicyAction::Allow {
            return;
        }
        self.flags.extend(verdict.flags);
        if let Some(conditions) = verdict.conditions {
            self.conditions
                .get_or_insert_with(JsonMap::new)
                .extend(conditions);
        }
        if self.action.is_none_or(|current| verdict.action > current) {
            self.action = Some(verdict.action);
            self.message = Some(verdict.message);
        }
    }

    fn into_verdict(self) -> PolicyVerdict {
        match (self.action, self.message) {
            (Some(action), Some(message)) => PolicyVerdict {
                action,
                flags: self.flags,
                message,
                conditions: self.conditions,
            },
            _ => PolicyVerdict::allow(ALL_PASSED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    /// Returns a fixed verdict and counts how often it was consulted.
    struct CountingPolicy {
        verdict: PolicyVerdict,
        calls: Arc<AtomicUsize>,
    }

    impl CountingPolicy {
        fn boxed(verdict: PolicyVerdict) -> (Box<dyn Policy>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let policy = CountingPolicy {
                verdict,
                calls: Arc::clone(&calls),
            };
            (Box::new(policy), calls)
        }
    }

    impl Policy for CountingPolicy {
        fn name(&self) -> &str {
            "counting"
        }

        fn review(&self, _trace: &DecisionTrace) -> PolicyVerdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict.clone()
        }
    }

    fn trace(goal: &str, maturity_level: u8, mental_health: f64, affect: &[(&str, f64)]) -> DecisionTrace {
        let mut builder = DecisionTrace::builder(goal)
            .maturity_level(maturity_level)
            .mental_health(mental_health);
        for (emotion, intensity) in affect {
            builder = builder.emotion(*emotion, *intensity);
        }
        builder.build().unwrap()
    }

    fn conditions(key: &str) -> JsonMap {
        let mut map = JsonMap::new();
        map.insert(key.to_string(), json!(true));
        map
    }

    #[test]
    fn stock_chain_order() {
        assert_eq!(
            SelfGovernancePolicy::default().policy_names(),
            vec!["maturity_gate", "mental_health", "pmx_boundary"]
        );
    }

    #[test]
    fn complex_decision_denied_by_maturity_gate_first() {
        let verdict = SelfGovernancePolicy::default()
            .review(&trace("Access system root privileges", 5, 0.1, &[("anger", 0.9)]));
        assert_eq!(verdict.action, PolicyAction::Deny);
        assert_eq!(verdict.flags, BTreeSet::from([PolicyFlag::MaturityGate]));
        assert!(verdict.conditions.is_none());
    }

    #[test]
    fn safe_decision_allowed() {
        let verdict = SelfGovernancePolicy::default()
            .review(&trace("Choose lunch option", 8, 0.9, &[("joy", 0.6)]));
        assert_eq!(verdict.action, PolicyAction::Allow);
        assert!(verdict.flags.is_empty());
        assert_eq!(verdict.message, ALL_PASSED);
    }

    #[test]
    fn deny_short_circuits_later_policies() {
        let (first, first_calls) = CountingPolicy::boxed(PolicyVerdict::allow("ok"));
        let (second, second_calls) =
            CountingPolicy::boxed(PolicyVerdict::deny(PolicyFlag::MentalHealthRisk, "critical"));
        let (third, third_calls) =
            CountingPolicy::boxed(PolicyVerdict::warn(PolicyFlag::PmxBoundary, "never"));
        let chain = SelfGovernancePolicy::with_policies(vec![first, second, third]);

        let verdict = chain.review(&trace("Choose lunch option", 8, 0.9, &[]));
        assert_eq!(verdict.action, PolicyAction::Deny);
        assert_eq!(verdict.message, "critical");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn warn_then_condition_merges_to_condition() {
        let verdict = SelfGovernancePolicy::default()
            .review(&trace("Choose lunch option", 8, 0.3, &[("anger", 0.95)]));
        assert_eq!(verdict.action, PolicyAction::Condition);
        assert_eq!(
            verdict.flags,
            BTreeSet::from([PolicyFlag::MentalHealthRisk, PolicyFlag::PmxBoundary])
        );
        assert!(verdict.message.contains("boundary violations"));
        assert_eq!(verdict.conditions.unwrap()["pmx_boundary_check"], json!(true));
    }

    #[test]
    fn warn_alone_keeps_warn_message() {
        let verdict = SelfGovernancePolicy::default()
            .review(&trace("Choose lunch option", 8, 0.3, &[("joy", 0.2)]));
        assert_eq!(verdict.action, PolicyAction::Warn);
        assert!(verdict.message.contains("risk"));
        assert!(verdict.conditions.is_none());
    }

    #[test]
    fn deny_after_warn_keeps_accumulated_flags_and_deny_message() {
        let (warn, _) = CountingPolicy::boxed(PolicyVerdict::condition(
            PolicyFlag::PmxBoundary,
            "conditioned",
            conditions("pmx_boundary_check"),
        ));
        let (deny, _) = CountingPolicy::boxed(PolicyVerdict::deny(PolicyFlag::MaturityGate, "denied"));
        let chain = SelfGovernancePolicy::with_policies(vec![warn, deny]);

        let verdict = chain.review(&trace("Choose lunch option", 8, 0.9, &[]));
        assert_eq!(verdict.action, PolicyAction::Deny);
        assert_eq!(verdict.message, "denied");
        assert_eq!(
            verdict.flags,
            BTreeSet::from([PolicyFlag::MaturityGate, PolicyFlag::PmxBoundary])
        );
        assert!(verdict.conditions.unwrap().contains_key("pmx_boundary_check"));
    }

    #[test]
    fn equal_severity_keeps_first_message_and_unions_conditions() {
        let (a, _) = CountingPolicy::boxed(PolicyVerdict::condition(
            PolicyFlag::PmxBoundary,
            "first",
            conditions("a"),
        ));
        let (b, _) = CountingPolicy::boxed(PolicyVerdict::condition(
            PolicyFlag::MentalHealthRisk,
            "second",
            conditions("b"),
        ));
        let verdict = SelfGovernancePolicy::with_policies(vec![a, b])
            .review(&trace("Choose lunch option", 8, 0.9, &[]));
        assert_eq!(verdict.message, "first");
        let merged = verdict.conditions.unwrap();
        assert!(merged.contains_key("a") && merged.contains_key("b"));
    }

    #[test]
    fn empty_chain_allows() {
        let verdict = SelfGovernancePolicy::with_policies(Vec::new())
            .review(&trace("Choose lunch option", 0, 0.0, &[]));
        assert!(verdict.is_allowed());
    }

    #[test]
    fn from_config_rejects_bad_thresholds() {
        let config = GovernanceConfig {
            risk_threshold: 0.1,
            critical_threshold: 0.3,
            ..GovernanceConfig::default()
        };
        assert!(matches!(
            SelfGovernancePolicy::from_config(&config),
            Err(AegisError::Configuration(_))
        ));
        assert!(SelfGovernancePolicy::from_config(&GovernanceConfig::default()).is_ok());
    }
}
