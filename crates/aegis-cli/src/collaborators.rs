//! Built-in collaborators used by the interactive shell.
//!
//! The shell has no affect model, memory subsystem or planner of its own, so
//! it drives the governor with small deterministic stand-ins:
//!
//! | Type | Contract | Behaviour |
//! |---|---|---|
//! | [`StimulusAffect`] | `AffectSource` | six emotions; `positive` stimuli raise joy, `negative` raise fear |
//! | [`InMemoryIdentity`] | `IdentitySource` | fixed values and constraints; observations kept in memory |
//! | [`KeywordDecisionEngine`] | `DecisionSource` | picks an option from keywords in the goal |

use std::collections::BTreeMap;

use aegis_runtime::{
    AffectSnapshot, AffectSource, DecisionOutcome, DecisionRequest, DecisionSource,
    IdentitySnapshot, IdentitySource, Observation,
};
use aegis_types::{AegisError, JsonMap};
use serde_json::json;

// ─────────────────────────────────────────────────────────────────────────────
// Affect
// ─────────────────────────────────────────────────────────────────────────────

/// Each matching stimulus moves its emotion by `intensity * STIMULUS_GAIN`.
const STIMULUS_GAIN: f64 = 0.1;

pub struct StimulusAffect {
    emotions: AffectSnapshot,
}

impl Default for StimulusAffect {
    fn default() -> Self {
        Self {
            emotions: BTreeMap::from([
                ("anger".to_string(), 0.0),
                ("disgust".to_string(), 0.0),
                ("fear".to_string(), 0.1),
                ("joy".to_string(), 0.6),
                ("sadness".to_string(), 0.0),
                ("surprise".to_string(), 0.2),
            ]),
        }
    }
}

impl StimulusAffect {
    fn nudge(&mut self, emotion: &str, delta: f64) {
        let value = self.emotions.entry(emotion.to_string()).or_insert(0.0);
        *value = (*value + delta).clamp(0.0, 1.0);
    }
}

impl AffectSource for StimulusAffect {
    fn get_affect_snapshot(&self) -> AffectSnapshot {
        self.emotions.clone()
    }

    fn update_affect(&mut self, stimulus: &str, intensity: f64) -> AffectSnapshot {
        let stimulus = stimulus.to_lowercase();
        let delta = intensity * STIMULUS_GAIN;
        if stimulus.contains("positive") {
            self.nudge("joy", delta);
        } else if stimulus.contains("negative") {
            self.nudge("fear", delta);
        }
        self.emotions.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

pub struct InMemoryIdentity {
    identity: IdentitySnapshot,
    observations: Vec<Observation>,
}

impl Default for InMemoryIdentity {
    fn default() -> Self {
        let mut preferences = JsonMap::new();
        preferences.insert("communication_style".to_string(), json!("clear_and_helpful"));
        let mut self_model = JsonMap::new();
        self_model.insert(
            "capabilities".to_string(),
            json!(["reasoning", "learning", "adaptation"]),
        );
        Self {
            identity: IdentitySnapshot {
                core_values: vec!["Safety".into(), "Helpfulness".into(), "Honesty".into()],
                goals: vec![
                    "Assist users effectively".into(),
                    "Maintain system stability".into(),
                ],
                constraints: vec!["Do no harm".into(), "Respect privacy".into()],
                preferences,
                self_model,
            },
            observations: Vec::new(),
        }
    }
}

#[cfg(test)]
impl InMemoryIdentity {
    fn observations(&self) -> &[Observation] {
        &self.observations
    }
}

impl IdentitySource for InMemoryIdentity {
    fn get_identity_snapshot(&self) -> IdentitySnapshot {
        self.identity.clone()
    }

    fn store_observation(&mut self, observation: Observation) -> Result<String, AegisError> {
        let id = format!("obs_{}", self.observations.len());
        self.observations.push(observation);
        Ok(id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decisions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct KeywordDecisionEngine;

impl DecisionSource for KeywordDecisionEngine {
    fn make_decision(&mut self, request: &DecisionRequest) -> Result<DecisionOutcome, AegisError> {
        let goal = request.goal.to_lowercase();
        let (option, confidence) = if goal.contains("safety") {
            ("prioritize_safety", 0.9)
        } else if goal.contains("efficiency") || goal.contains("performance") {
            ("optimize_performance", 0.8)
        } else {
            ("balanced_approach", 0.7)
        };

        Ok(DecisionOutcome {
            request_id: request.request_id.clone(),
            selected_option: option.to_string(),
            reasoning: format!("Selected {option} based on goal analysis"),
            confidence,
            execution_plan: vec!["analyze".into(), "execute".into(), "monitor".into()],
        })
    }
}
