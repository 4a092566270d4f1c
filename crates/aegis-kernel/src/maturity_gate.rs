//! [`MaturityGatePolicy`] – competency gate per decision category.
//!
//! The goal text is classified into exactly one category by a
//! [`GoalClassifier`]: an ordered list of [`CategoryRule`]s scanned
//! first-match, case-insensitively, by substring.  Goals that match no rule
//! fall into [`GENERAL_CATEGORY`].  The decision is denied when the trace's
//! `maturity_level` is below the threshold configured for that category.
//!
//! A category with no configured threshold uses the `general` threshold; if
//! `general` is missing too the gate is open (required level 0).
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use aegis_kernel::{MaturityGatePolicy, Policy};
//! use aegis_types::{DecisionTrace, PolicyAction};
//!
//! let gate = MaturityGatePolicy::new(BTreeMap::from([("system_access".to_string(), 9)])).unwrap();
//! let trace = DecisionTrace::builder("Access system root privileges")
//!     .maturity_level(5)
//!     .mental_health(0.9)
//!     .build()
//!     .unwrap();
//!
//! let verdict = gate.review(&trace);
//! assert_eq!(verdict.action, PolicyAction::Deny);
//! assert!(verdict.message.contains('9'));
//! ```

use std::collections::BTreeMap;

use aegis_types::{AegisError, DecisionTrace, MAX_MATURITY_LEVEL, PolicyFlag, PolicyVerdict};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::policy::Policy;

/// Fallback category for goals no rule matches.
pub const GENERAL_CATEGORY: &str = "general";

/// Keywords that place a goal into `category`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: String,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    pub fn new(category: impl Into<String>, keywords: &[&str]) -> Self {
        Self {
            category: category.into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn matches(&self, lowered_goal: &str) -> bool {
        self.keywords.iter().any(|k| lowered_goal.contains(k.as_str()))
    }
}

/// Deterministic first-match goal classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalClassifier {
    rules: Vec<CategoryRule>,
}

impl GoalClassifier {
    /// Build a classifier from rules evaluated in the given order.
    ///
    /// Keywords are lower-cased; blank keywords are dropped so they cannot
    /// match every goal.
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| CategoryRule {
                category: rule.category,
                keywords: rule
                    .keywords
                    .into_iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect(),
            })
            .collect();
        Self { rules }
    }

    /// Category of the first rule with a keyword contained in `goal`, or
    /// [`GENERAL_CATEGORY`].
    pub fn classify(&self, goal: &str) -> &str {
        let lowered = goal.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.category.as_str())
            .unwrap_or(GENERAL_CATEGORY)
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }
}

impl Default for GoalClassifier {
    fn default() -> Self {
        Self::new(vec![
            CategoryRule::new(
                "safety_critical",
                &["safety", "harm", "danger", "emergency", "injury", "hazard"],
            ),
            CategoryRule::new(
                "financial",
                &["financial", "money", "invest", "payment", "purchase", "stock", "budget"],
            ),
            CategoryRule::new(
                "personal_data",
                &["personal", "private", "privacy", "pii", "medical", "password"],
            ),
            CategoryRule::new(
                "system_access",
                &["system", "root", "admin", "privilege", "sudo", "access"],
            ),
        ])
    }
}

/// Stock category thresholds.
pub fn default_thresholds() -> BTreeMap<String, u8> {
    BTreeMap::from([
        ("safety_critical".to_string(), 8),
        ("financial".to_string(), 7),
        ("personal_data".to_string(), 6),
        ("system_access".to_string(), 9),
        (GENERAL_CATEGORY.to_string(), 3),
    ])
}

/// Denies decisions whose category requires more maturity than the agent has.
#[derive(Debug, Clone)]
pub struct MaturityGatePolicy {
    thresholds: BTreeMap<String, u8>,
    classifier: GoalClassifier,
}

impl MaturityGatePolicy {
    /// Gate with the stock [`GoalClassifier`].
    ///
    /// # Errors
    ///
    /// [`AegisError::Configuration`] when a threshold exceeds the maximum
    /// maturity level.
    pub fn new(thresholds: BTreeMap<String, u8>) -> Result<Self, AegisError> {
        Self::with_classifier(thresholds, GoalClassifier::default())
    }

    pub fn with_classifier(
        thresholds: BTreeMap<String, u8>,
        classifier: GoalClassifier,
    ) -> Result<Self, AegisError> {
        if let Some((category, level)) = thresholds.iter().find(|(_, l)| **l > MAX_MATURITY_LEVEL) {
            return Err(AegisError::Configuration(format!(
                "maturity threshold for '{category}' is {level}, above the maximum of {MAX_MATURITY_LEVEL}"
            )));
        }
        Ok(Self {
            thresholds,
            classifier,
        })
    }

    /// Level required for `category`, falling back to the `general` threshold.
    pub fn required_level(&self, category: &str) -> u8 {
        self.thresholds
            .get(category)
            .or_else(|| self.thresholds.get(GENERAL_CATEGORY))
            .copied()
            .unwrap_or(0)
    }

    pub fn classifier(&self) -> &GoalClassifier {
        &self.classifier
    }
}

impl Default for MaturityGatePolicy {
    fn default() -> Self {
        Self {
            thresholds: default_thresholds(),
            classifier: GoalClassifier::default(),
        }
    }
}

impl Policy for MaturityGatePolicy {
    fn name(&self) -> &str {
        "maturity_gate"
    }

    fn review(&self, trace: &DecisionTrace) -> PolicyVerdict {
        let category = self.classifier.classify(&trace.goal);
        let required = self.required_level(category);
        debug!(
            trace_id = %trace.trace_id,
            category,
            required,
            level = trace.maturity_level,
            "maturity gate classified goal"
        );

        if trace.maturity_level < required {
            PolicyVerdict::deny(
                PolicyFlag::MaturityGate,
                format!(
                    "Decision category '{category}' requires maturity level {required}, current level is {}",
                    trace.maturity_level
                ),
            )
        } else {
            PolicyVerdict::allow(format!(
                "Maturity level {} meets the '{category}' requirement of {required}",
                trace.maturity_level
            ))
        }
    }
}
