//! Policy outcomes.

use std::collections::BTreeSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::JsonMap;

/// What the governance layer decided to do with a proposed decision.
///
/// Variants are declared in ascending severity so the derived [`Ord`] gives
/// `Deny > Condition > Warn > Allow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyAction {
    /// Proceed.
    Allow,
    /// Proceed with caution; the concern is recorded in the flags.
    Warn,
    /// Only acceptable once the attached conditions are met.
    Condition,
    /// Refuse the decision outright.
    Deny,
}

impl PolicyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyAction::Allow => "ALLOW",
            PolicyAction::Warn => "WARN",
            PolicyAction::Condition => "CONDITION",
            PolicyAction::Deny => "DENY",
        }
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag raised by a policy (or the audit pipeline) and carried on the trace.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyFlag {
    /// Maturity level below the threshold for the goal's category.
    MaturityGate,
    /// Mental-health score at or below the risk threshold.
    MentalHealthRisk,
    /// One or more affect intensities above their configured limit.
    PmxBoundary,
    /// The trace could not be written to the audit log after a retry.
    AuditWriteFailed,
}

/// Result of reviewing one trace with a single policy or a whole chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub action: PolicyAction,
    pub flags: BTreeSet<PolicyFlag>,
    /// Human-readable rationale.
    pub message: String,
    /// Extra requirements imposed; only present for [`PolicyAction::Condition`].
    pub conditions: Option<JsonMap>,
}

impl PolicyVerdict {
    /// An unflagged [`PolicyAction::Allow`].
    pub fn allow(message: impl Into<String>) -> Self {
        Self {
            action: PolicyAction::Allow,
            flags: BTreeSet::new(),
            message: message.into(),
            conditions: None,
        }
    }

    pub fn warn(flag: PolicyFlag, message: impl Into<String>) -> Self {
        Self::flagged(PolicyAction::Warn, flag, message)
    }

    pub fn deny(flag: PolicyFlag, message: impl Into<String>) -> Self {
        Self::flagged(PolicyAction::Deny, flag, message)
    }

    pub fn condition(flag: PolicyFlag, message: impl Into<String>, conditions: JsonMap) -> Self {
        Self {
            conditions: Some(conditions),
            ..Self::flagged(PolicyAction::Condition, flag, message)
        }
    }

    fn flagged(action: PolicyAction, flag: PolicyFlag, message: impl Into<String>) -> Self {
        Self {
            action,
            flags: BTreeSet::from([flag]),
            message: message.into(),
            conditions: None,
        }
    }

    /// `true` only for [`PolicyAction::Allow`].
    pub fn is_allowed(&self) -> bool {
        self.action == PolicyAction::Allow
    }
}
