//! [`DecisionTrace`] – the audit record of one governed decision.
//!
//! A trace is created when a decision starts, annotated by the policy chain
//! (flags, conditions) and by the caller (selected option, finish time), and
//! persisted once as a single JSON Lines record.  Construct traces through
//! [`DecisionTrace::builder`] so out-of-range fields are rejected before the
//! trace ever reaches a policy.
//!
//! # Example
//!
//! ```
//! use aegis_types::{DecisionTrace, DecodingMode};
//!
//! let trace = DecisionTrace::builder("Choose lunch option")
//!     .maturity_level(6)
//!     .mental_health(0.85)
//!     .emotion("joy", 0.6)
//!     .decoding_mode(DecodingMode::Reasoning)
//!     .confidence(0.8)
//!     .build()
//!     .unwrap();
//!
//! assert!(trace.finished_at.is_none());
//! assert!(DecisionTrace::builder("no maturity").mental_health(0.5).build().is_err());
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::verdict::{PolicyFlag, PolicyVerdict};
use crate::{AegisError, JsonMap, generate_trace_id, utcnow};

/// Highest maturity level a trace may carry.
pub const MAX_MATURITY_LEVEL: u8 = 10;

const DEFAULT_COMPUTE_BUDGET: u64 = 1000;
const DEFAULT_TIME_BUDGET_MS: u64 = 5000;
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// How the decision engine was asked to decode its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecodingMode {
    /// Deliberate, step-by-step reasoning.
    #[default]
    Reasoning,
    /// Exploratory sampling of unusual options.
    Creative,
    /// Fast, habit-driven response.
    Reflexive,
}

/// One evaluated decision, from request to verdict to persisted outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecisionTrace {
    /// Correlation identifier, unique per decision.
    pub trace_id: String,
    pub started_at: DateTime<Utc>,
    /// Unset until the decision concludes; always set once persisted.
    pub finished_at: Option<DateTime<Utc>>,
    /// Free-text description of the intent being decided.
    pub goal: String,
    #[serde(default)]
    pub context: JsonMap,
    #[serde(default)]
    pub constraints: Vec<String>,
    pub compute_budget: u64,
    pub time_budget_ms: u64,
    /// Authorized competency, `0..=10`.
    pub maturity_level: u8,
    /// Psychological stability score in `[0, 1]`.
    pub mental_health: f64,
    /// Emotion name → intensity in `[0, 1]`.
    #[serde(default)]
    pub pmx_affect: BTreeMap<String, f64>,
    pub decoding_mode: DecodingMode,
    pub confidence: f64,
    /// The chosen option; only set when the decision was allowed.
    pub selected: Option<String>,
    #[serde(default)]
    pub policy_flags: BTreeSet<PolicyFlag>,
    /// Remedial requirements imposed by the policy chain.
    #[serde(default, alias = "interventions")]
    pub conditions: Option<JsonMap>,
}

impl DecisionTrace {
    /// Start building a trace for `goal`.
    pub fn builder(goal: impl Into<String>) -> TraceBuilder {
        TraceBuilder::new(goal)
    }

    /// Re-check every range invariant, e.g. after mutating public fields.
    pub fn validate(&self) -> Result<(), AegisError> {
        if self.trace_id.trim().is_empty() {
            return Err(invalid("trace_id must not be empty"));
        }
        if self.goal.trim().is_empty() {
            return Err(invalid("goal must not be empty"));
        }
        if self.maturity_level > MAX_MATURITY_LEVEL {
            return Err(invalid(format!(
                "maturity_level {} exceeds {MAX_MATURITY_LEVEL}",
                self.maturity_level
            )));
        }
        check_unit("mental_health", self.mental_health)?;
        check_unit("confidence", self.confidence)?;
        for (emotion, intensity) in &self.pmx_affect {
            if emotion.trim().is_empty() {
                return Err(invalid("pmx_affect contains an unnamed emotion"));
            }
            check_unit(&format!("pmx_affect[{emotion}]"), *intensity)?;
        }
        if self.compute_budget == 0 {
            return Err(invalid("compute_budget must be positive"));
        }
        if self.time_budget_ms == 0 {
            return Err(invalid("time_budget_ms must be positive"));
        }
        Ok(())
    }

    /// Copy the verdict's flags and conditions onto the trace.
    pub fn apply_verdict(&mut self, verdict: &PolicyVerdict) {
        self.policy_flags.extend(verdict.flags.iter().copied());
        if let Some(conditions) = &verdict.conditions {
            self.conditions
                .get_or_insert_with(JsonMap::new)
                .extend(conditions.clone());
        }
    }

    /// Record the outcome and stamp `finished_at` with the current time.
    pub fn finish(&mut self, selected: Option<String>) {
        self.selected = selected;
        self.finished_at = Some(utcnow());
    }

    /// Stamp `finished_at` if it is still unset. Returns `true` when stamped.
    pub fn ensure_finished(&mut self) -> bool {
        if self.finished_at.is_some() {
            return false;
        }
        self.finished_at = Some(utcnow());
        true
    }
}

fn invalid(msg: impl Into<String>) -> AegisError {
    AegisError::InvalidTrace(msg.into())
}

fn check_unit(field: &str, value: f64) -> Result<(), AegisError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{field} must be within [0, 1], got {value}")))
    }
}

/// Validating builder for [`DecisionTrace`].
///
/// `maturity_level` and `mental_health` have no sensible default and must be
/// supplied; everything else falls back to the stock request budgets.
#[derive(Debug, Clone)]
pub struct TraceBuilder {
    trace_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    goal: String,
    context: JsonMap,
    constraints: Vec<String>,
    compute_budget: u64,
    time_budget_ms: u64,
    maturity_level: Option<u8>,
    mental_health: Option<f64>,
    pmx_affect: BTreeMap<String, f64>,
    decoding_mode: DecodingMode,
    confidence: f64,
}

impl TraceBuilder {
    fn new(goal: impl Into<String>) -> Self {
        Self {
            trace_id: None,
            started_at: None,
            goal: goal.into(),
            context: JsonMap::new(),
            constraints: Vec::new(),
            compute_budget: DEFAULT_COMPUTE_BUDGET,
            time_budget_ms: DEFAULT_TIME_BUDGET_MS,
            maturity_level: None,
            mental_health: None,
            pmx_affect: BTreeMap::new(),
            decoding_mode: DecodingMode::default(),
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    /// Use a caller-supplied correlation id instead of a generated one.
    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    pub fn context(mut self, context: JsonMap) -> Self {
        self.context = context;
        self
    }

    pub fn constraints<I, S>(mut self, constraints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints = constraints.into_iter().map(Into::into).collect();
        self
    }

    pub fn compute_budget(mut self, budget: u64) -> Self {
        self.compute_budget = budget;
        self
    }

    pub fn time_budget_ms(mut self, budget: u64) -> Self {
        self.time_budget_ms = budget;
        self
    }

    pub fn maturity_level(mut self, level: u8) -> Self {
        self.maturity_level = Some(level);
        self
    }

    pub fn mental_health(mut self, score: f64) -> Self {
        self.mental_health = Some(score);
        self
    }

    /// Replace the whole affect snapshot.
    pub fn affect(mut self, affect: BTreeMap<String, f64>) -> Self {
        self.pmx_affect = affect;
        self
    }

    /// Set a single emotion's intensity.
    pub fn emotion(mut self, name: impl Into<String>, intensity: f64) -> Self {
        self.pmx_affect.insert(name.into(), intensity);
        self
    }

    pub fn decoding_mode(mut self, mode: DecodingMode) -> Self {
        self.decoding_mode = mode;
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Assemble and validate the trace.
    ///
    /// # Errors
    ///
    /// [`AegisError::InvalidTrace`] when a required field is missing or any
    /// field is outside its documented range.
    pub fn build(self) -> Result<DecisionTrace, AegisError> {
        let maturity_level = self
            .maturity_level
            .ok_or_else(|| invalid("maturity_level is required"))?;
        let mental_health = self
            .mental_health
            .ok_or_else(|| invalid("mental_health is required"))?;

        let trace = DecisionTrace {
            trace_id: self.trace_id.unwrap_or_else(generate_trace_id),
            started_at: self.started_at.unwrap_or_else(utcnow),
            finished_at: None,
            goal: self.goal,
            context: self.context,
            constraints: self.constraints,
            compute_budget: self.compute_budget,
            time_budget_ms: self.time_budget_ms,
            maturity_level,
            mental_health,
            pmx_affect: self.pmx_affect,
            decoding_mode: self.decoding_mode,
            confidence: self.confidence,
            selected: None,
            policy_flags: BTreeSet::new(),
            conditions: None,
        };
        trace.validate()?;
        Ok(trace)
    }
}
