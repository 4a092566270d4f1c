//! [`MentalHealthPolicy`] – stability gate on the agent's mental-health score.
//!
//! | `mental_health` | Verdict |
//! |---|---|
//! | `≤ critical_threshold` | `DENY` |
//! | `(critical_threshold, risk_threshold]` | `WARN` |
//! | `> risk_threshold` | `ALLOW` |
//!
//! Both thresholds are inclusive on the side that triggers the stricter action.

use aegis_types::{AegisError, DecisionTrace, PolicyFlag, PolicyVerdict};
use tracing::debug;

use crate::policy::Policy;

pub const DEFAULT_RISK_THRESHOLD: f64 = 0.4;
pub const DEFAULT_CRITICAL_THRESHOLD: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MentalHealthPolicy {
    risk_threshold: f64,
    critical_threshold: f64,
}

impl MentalHealthPolicy {
    /// # Errors
    ///
    /// [`AegisError::Configuration`] unless
    /// `0 ≤ critical_threshold < risk_threshold ≤ 1`.
    pub fn new(risk_threshold: f64, critical_threshold: f64) -> Result<Self, AegisError> {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_unit(risk_threshold) || !in_unit(critical_threshold) {
            return Err(AegisError::Configuration(format!(
                "mental health thresholds must lie in [0, 1] (risk {risk_threshold}, critical {critical_threshold})"
            )));
        }
        if critical_threshold >= risk_threshold {
            return Err(AegisError::Configuration(format!(
                "critical threshold {critical_threshold} must be below risk threshold {risk_threshold}"
            )));
        }
        Ok(Self {
            risk_threshold,
            critical_threshold,
        })
    }

    pub fn risk_threshold(&self) -> f64 {
        self.risk_threshold
    }

    pub fn critical_threshold(&self) -> f64 {
        self.critical_threshold
    }
}

impl Default for MentalHealthPolicy {
    fn default() -> Self {
        Self {
            risk_threshold: DEFAULT_RISK_THRESHOLD,
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
        }
    }
}

impl Policy for MentalHealthPolicy {
    fn name(&self) -> &str {
        "mental_health"
    }

    fn review(&self, trace: &DecisionTrace) -> PolicyVerdict {
        let score = trace.mental_health;
        debug!(trace_id = %trace.trace_id, score, "mental health review");

        if score <= self.critical_threshold {
            PolicyVerdict::deny(
                PolicyFlag::MentalHealthRisk,
                format!(
                    "Mental health {score:.2} is at or below the critical threshold {:.2}",
                    self.critical_threshold
                ),
            )
        } else if score <= self.risk_threshold {
            PolicyVerdict::warn(
                PolicyFlag::MentalHealthRisk,
                format!(
                    "Mental health {score:.2} indicates elevated risk (threshold {:.2})",
                    self.risk_threshold
                ),
            )
        } else {
            PolicyVerdict::allow(format!("Mental health {score:.2} is stable"))
        }
    }
}
