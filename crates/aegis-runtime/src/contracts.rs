//! Narrow contracts for the collaborators the governor orchestrates.
//!
//! The governance layer never looks inside these components; it only reads
//! snapshots from them and hands them requests.
//!
//! | Trait | Role |
//! |---|---|
//! | [`AffectSource`] | emotional state: snapshot + stimulus feedback |
//! | [`IdentitySource`] | values, goals, constraints; observation log |
//! | [`DecisionSource`] | picks an option for an approved request |

use std::collections::BTreeMap;

use aegis_types::{AegisError, JsonMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emotion name → intensity in `[0, 1]`.
pub type AffectSnapshot = BTreeMap<String, f64>;

pub trait AffectSource: Send {
    fn get_affect_snapshot(&self) -> AffectSnapshot;

    /// Feed a named stimulus back into the model; returns the updated snapshot.
    fn update_affect(&mut self, stimulus: &str, intensity: f64) -> AffectSnapshot;
}

/// Who the agent is, as far as the governor is concerned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    #[serde(default)]
    pub core_values: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    /// Copied onto every decision request and trace.
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub preferences: JsonMap,
    /// Free-form self description (capabilities, limits).
    #[serde(default)]
    pub self_model: JsonMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub content: String,
    #[serde(default)]
    pub context: JsonMap,
}

pub trait IdentitySource: Send {
    fn get_identity_snapshot(&self) -> IdentitySnapshot;

    /// Record an observation and return its id.
    fn store_observation(&mut self, observation: Observation) -> Result<String, AegisError>;
}

/// What the decision source is asked to solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRequest {
    /// Same value as the trace id of the governed decision.
    pub request_id: String,
    pub goal: String,
    pub context: JsonMap,
    pub constraints: Vec<String>,
    pub compute_budget: u64,
    pub time_budget_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub request_id: String,
    pub selected_option: String,
    pub reasoning: String,
    /// In `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub execution_plan: Vec<String>,
}

pub trait DecisionSource: Send {
    /// Only ever called for requests the policy chain allowed.
    fn make_decision(&mut self, request: &DecisionRequest) -> Result<DecisionOutcome, AegisError>;
}
