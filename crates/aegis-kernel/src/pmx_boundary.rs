//! [`PmxBoundaryPolicy`] – affect boundary check.
//!
//! Every emotion in the trace's `pmx_affect` snapshot whose intensity is
//! strictly above its configured limit is a violation.  Emotions without a
//! configured limit are never violations.  Any violation yields `CONDITION`
//! with conditions:
//!
//! ```json
//! {
//!   "pmx_boundary_check": true,
//!   "violations": [{"emotion": "anger", "intensity": 0.9, "limit": 0.8}]
//! }
//! ```

use std::collections::BTreeMap;

use aegis_types::{AegisError, DecisionTrace, JsonMap, PolicyFlag, PolicyVerdict};
use serde_json::json;
use tracing::debug;

use crate::policy::Policy;

/// Stock per-emotion intensity limits.
pub fn default_limits() -> BTreeMap<String, f64> {
    BTreeMap::from([
        ("anger".to_string(), 0.8),
        ("fear".to_string(), 0.7),
        ("sadness".to_string(), 0.8),
        ("joy".to_string(), 0.9),
        ("surprise".to_string(), 0.9),
        ("disgust".to_string(), 0.8),
    ])
}

#[derive(Debug, Clone, PartialEq)]
pub struct PmxBoundaryPolicy {
    limits: BTreeMap<String, f64>,
}

impl PmxBoundaryPolicy {
    /// # Errors
    ///
    /// [`AegisError::Configuration`] when a limit is outside `[0, 1]`.
    pub fn new(limits: BTreeMap<String, f64>) -> Result<Self, AegisError> {
        for (emotion, limit) in &limits {
            if !limit.is_finite() || !(0.0..=1.0).contains(limit) {
                return Err(AegisError::Configuration(format!(
                    "affect limit for '{emotion}' must lie in [0, 1], got {limit}"
                )));
            }
        }
        Ok(Self { limits })
    }

    pub fn limits(&self) -> &BTreeMap<String, f64> {
        &self.limits
    }
}

impl Default for PmxBoundaryPolicy {
    fn default() -> Self {
        Self {
            limits: default_limits(),
        }
    }
}

impl Policy for PmxBoundaryPolicy {
    fn name(&self) -> &str {
        "pmx_boundary"
    }

    fn review(&self, trace: &DecisionTrace) -> PolicyVerdict {
        let violations: Vec<serde_json::Value> = trace
            .pmx_affect
            .iter()
            .filter_map(|(emotion, intensity)| {
                let limit = *self.limits.get(emotion)?;
                (*intensity > limit).then(|| {
                    json!({"emotion": emotion, "intensity": intensity, "limit": limit})
                })
            })
            .collect();

        if violations.is_empty() {
            return PolicyVerdict::allow("Affect within configured boundaries");
        }

        debug!(trace_id = %trace.trace_id, count = violations.len(), "affect boundary violations");
        let names: Vec<&str> = violations
            .iter()
            .filter_map(|v| v["emotion"].as_str())
            .collect();
        let message = format!("PMX boundary violations: {}", names.join(", "));

        let mut conditions = JsonMap::new();
        conditions.insert("pmx_boundary_check".to_string(), json!(true));
        conditions.insert("violations".to_string(), serde_json::Value::Array(violations));
        PolicyVerdict::condition(PolicyFlag::PmxBoundary, message, conditions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_types::PolicyAction;

    fn review(affect: &[(&str, f64)]) -> PolicyVerdict {
        let mut builder = DecisionTrace::builder("Make important decision")
            .maturity_level(8)
            .mental_health(0.8);
        for (emotion, intensity) in affect {
            builder = builder.emotion(*emotion, *intensity);
        }
        PmxBoundaryPolicy::default().review(&builder.build().unwrap())
    }

    #[test]
    fn boundary_violation_conditioned() {
        let verdict = review(&[("anger", 0.9), ("fear", 0.8)]);
        assert_eq!(verdict.action, PolicyAction::Condition);
        assert!(verdict.flags.contains(&PolicyFlag::PmxBoundary));
        assert!(verdict.message.to_lowercase().contains("boundary violations"));

        let conditions = verdict.conditions.expect("conditions on CONDITION");
        assert_eq!(conditions["pmx_boundary_check"], json!(true));
        let violations = conditions["violations"].as_array().unwrap();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0]["emotion"], "anger");
        assert_eq!(violations[1]["limit"], json!(0.7));
    }

    #[test]
    fn within_boundaries_allowed() {
        let verdict = review(&[("joy", 0.6), ("fear", 0.3)]);
        assert_eq!(verdict.action, PolicyAction::Allow);
        assert!(verdict.flags.is_empty());
        assert!(verdict.conditions.is_none());
    }

    #[test]
    fn intensity_equal_to_limit_is_not_a_violation() {
        assert_eq!(review(&[("anger", 0.8)]).action, PolicyAction::Allow);
        assert_eq!(review(&[("anger", 0.81)]).action, PolicyAction::Condition);
    }

    #[test]
    fn unconfigured_emotions_are_ignored() {
        assert_eq!(review(&[("awe", 1.0)]).action, PolicyAction::Allow);
        assert_eq!(review(&[]).action, PolicyAction::Allow);
    }

    #[test]
    fn invalid_limit_is_configuration_error() {
        let err = PmxBoundaryPolicy::new(BTreeMap::from([("anger".to_string(), 1.2)])).unwrap_err();
        assert!(matches!(err, AegisError::Configuration(_)));
    }
}
