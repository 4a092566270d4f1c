//! [`Governor`] – the per-decision control path.
//!
//! Each call to [`Governor::make_decision`]:
//!
//! 1. **Snapshot** – read the affect and identity collaborators.
//! 2. **Trace** – build a [`DecisionTrace`] (constraints come from identity)
//!    and the matching [`DecisionRequest`].
//! 3. **Review** – run the [`SelfGovernancePolicy`] chain and copy the
//!    verdict's flags and conditions onto the trace.
//! 4. **Decide** – only on `ALLOW`: ask the [`DecisionSource`], record the
//!    chosen option, store an observation and feed the affect model a
//!    `decision_made_<option>` stimulus.  Any other verdict blocks the
//!    decision source entirely.
//! 5. **Audit** – stamp `finished_at` and hand the trace to the
//!    [`TraceLogger`].
//! 6. **Notify** – best-effort publish on [`topics::DECISION_MADE`].
//!
//! Audit and notification are independent paths: an observer of
//! `aegis.decision.made` must not assume the trace is already on disk.
//!
//! # Lifecycle
//!
//! [`start`](Governor::start) starts the bus, then the logger, then announces
//! [`topics::SYSTEM_START`].  [`stop`](Governor::stop) announces
//! [`topics::SYSTEM_STOP`], drains the logger, stops the bus and finally
//! rotates the trace log.  Decisions made while stopped are still audited
//! (synchronously) but nobody is notified.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use aegis_kernel::{GovernanceConfig, SelfGovernancePolicy};
use aegis_memory::{DEFAULT_TRACE_LOG, LocalJsonlStore, StateStore, TraceLogger};
use aegis_middleware::{EventBus, topics};
use aegis_types::{
    AegisError, DecisionTrace, DecodingMode, JsonMap, MAX_MATURITY_LEVEL, PolicyAction,
    PolicyFlag, PolicyVerdict, utcnow,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::contracts::{
    AffectSnapshot, AffectSource, DecisionRequest, DecisionSource, IdentitySnapshot,
    IdentitySource, Observation,
};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Confidence recorded on a trace before the decision source answers.
const INITIAL_CONFIDENCE: f64 = 0.8;

/// Intensity of the stimulus fed back to the affect model after a decision.
const DECISION_STIMULUS_INTENSITY: f64 = 0.3;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`Governor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Base directory of the state store.
    pub state_path: PathBuf,
    /// Stream the decision traces are appended to.
    pub trace_log: String,
    /// Rotate the trace log on shutdown once it exceeds this many megabytes.
    pub rotate_max_mb: f64,
    /// Archives kept per rotation.
    pub rotate_max_files: usize,
    /// Starting maturity level, `0..=10`.
    pub maturity_level: u8,
    /// Starting mental-health score, `[0, 1]`.
    pub mental_health: f64,
    pub compute_budget: u64,
    pub time_budget_ms: u64,
    pub decoding_mode: DecodingMode,
    pub governance: GovernanceConfig,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(".aegis_state"),
            trace_log: DEFAULT_TRACE_LOG.to_string(),
            rotate_max_mb: 100.0,
            rotate_max_files: 5,
            maturity_level: 6,
            mental_health: 0.85,
            compute_budget: 1000,
            time_budget_ms: 5000,
            decoding_mode: DecodingMode::Reasoning,
            governance: GovernanceConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reports
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// The chain allowed the decision and the decision source answered.
    Approved,
    /// The chain returned anything other than `ALLOW`.
    Blocked,
}

/// Outcome of one [`Governor::make_decision`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionReport {
    pub trace_id: String,
    pub status: DecisionStatus,
    pub policy_action: PolicyAction,
    pub decision: Option<String>,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,
    /// The chain's rationale.
    pub message: String,
    pub flags: BTreeSet<PolicyFlag>,
    pub conditions: Option<JsonMap>,
}

impl DecisionReport {
    fn blocked(trace_id: &str, verdict: &PolicyVerdict) -> Self {
        Self {
            trace_id: trace_id.to_string(),
            status: DecisionStatus::Blocked,
            policy_action: verdict.action,
            decision: None,
            reasoning: None,
            confidence: None,
            message: verdict.message.clone(),
            flags: verdict.flags.clone(),
            conditions: verdict.conditions.clone(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == DecisionStatus::Approved
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub maturity_level: u8,
    pub mental_health: f64,
    pub pmx_affect: AffectSnapshot,
    pub identity: IdentitySnapshot,
    /// Decisions approved and answered since construction.
    pub decision_count: usize,
    pub bus_running: bool,
    pub logger_running: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Governor
// ─────────────────────────────────────────────────────────────────────────────

/// Owns the audit pipeline, the policy chain and the bus, and routes every
/// decision through them.
pub struct Governor {
    config: GovernorConfig,
    store: Arc<LocalJsonlStore>,
    logger: TraceLogger,
    policy: SelfGovernancePolicy,
    bus: EventBus,
    affect: Box<dyn AffectSource>,
    identity: Box<dyn IdentitySource>,
    decisions: Box<dyn DecisionSource>,
    maturity_level: u8,
    mental_health: f64,
    decision_count: usize,
}

impl Governor {
    /// Open the state store and build the policy chain.
    ///
    /// # Errors
    ///
    /// - [`AegisError::Configuration`] for invalid governance thresholds or
    ///   out-of-range starting maturity / mental health.
    /// - [`AegisError::StorageIo`] when the state directory cannot be created.
    pub fn new(
        config: GovernorConfig,
        affect: Box<dyn AffectSource>,
        identity: Box<dyn IdentitySource>,
        decisions: Box<dyn DecisionSource>,
    ) -> Result<Self, AegisError> {
        check_maturity(config.maturity_level)?;
        check_mental_health(config.mental_health)?;
        let policy = SelfGovernancePolicy::from_config(&config.governance)?;

        let store = Arc::new(LocalJsonlStore::new(&config.state_path)?);
        let logger = TraceLogger::new(store.clone(), config.trace_log.clone());
        info!(state_path = %config.state_path.display(), trace_log = %config.trace_log, "governor initialised");

        Ok(Self {
            maturity_level: config.maturity_level,
            mental_health: config.mental_health,
            config,
            store,
            logger,
            policy,
            bus: EventBus::new(),
            affect,
            identity,
            decisions,
            decision_count: 0,
        })
    }

    /// Start the bus and the trace logger, then announce the start.
    pub async fn start(&self) -> Result<(), AegisError> {
        self.bus.start();
        self.logger.start().await;
        self.bus.publish(
            topics::SYSTEM_START,
            json!({
                "timestamp": utcnow(),
                "maturity_level": self.maturity_level,
                "mental_health": self.mental_health,
            }),
        )?;
        info!("governor started");
        Ok(())
    }

    /// Announce the stop, drain the logger, stop the bus, rotate the trace log.
    ///
    /// Returns the archive path when the trace log was rotated.
    pub async fn stop(&self) -> Result<Option<PathBuf>, AegisError> {
        if self.bus.is_running() {
            self.bus.publish(
                topics::SYSTEM_STOP,
                json!({"timestamp": utcnow(), "decision_count": self.decision_count}),
            )?;
        }
        self.logger.stop().await;
        self.bus.stop();
        let archive = self.rotate_traces()?;
        info!(decision_count = self.decision_count, "governor stopped");
        Ok(archive)
    }

    /// Govern one decision end to end.
    ///
    /// # Errors
    ///
    /// - [`AegisError::InvalidTrace`] when a collaborator snapshot is out of
    ///   range (e.g. an affect intensity above 1).
    /// - [`AegisError::Collaborator`] when the decision source fails or
    ///   returns an invalid confidence; the trace is still audited.
    /// - Storage errors from the synchronous audit path when the logger is
    ///   not running.
    pub fn make_decision(&mut self, goal: &str, context: JsonMap) -> Result<DecisionReport, AegisError> {
        let affect = self.affect.get_affect_snapshot();
        let identity = self.identity.get_identity_snapshot();

        let mut trace = DecisionTrace::builder(goal)
            .context(context.clone())
            .constraints(identity.constraints.clone())
            .compute_budget(self.config.compute_budget)
            .time_budget_ms(self.config.time_budget_ms)
            .maturity_level(self.maturity_level)
            .mental_health(self.mental_health)
            .affect(affect)
            .decoding_mode(self.config.decoding_mode)
            .confidence(INITIAL_CONFIDENCE)
            .build()?;
        let request = DecisionRequest {
            request_id: trace.trace_id.clone(),
            goal: goal.to_string(),
            context,
            constraints: identity.constraints,
            compute_budget: trace.compute_budget,
            time_budget_ms: trace.time_budget_ms,
        };

        let verdict = self.policy.review(&trace);
        trace.apply_verdict(&verdict);
        debug!(trace_id = %trace.trace_id, action = %verdict.action, "verdict applied");

        let report = if verdict.is_allowed() {
            match self.decide(&mut trace, &request, &verdict) {
                Ok(report) => report,
                Err(e) => {
                    trace.finish(None);
                    self.logger.log_trace(trace)?;
                    return Err(e);
                }
            }
        } else {
            trace.finish(None);
            info!(trace_id = %trace.trace_id, action = %verdict.action, "decision blocked");
            DecisionReport::blocked(&trace.trace_id, &verdict)
        };

        self.logger.log_trace(trace)?;
        self.notify(goal, &report);
        Ok(report)
    }

    fn decide(
        &mut self,
        trace: &mut DecisionTrace,
        request: &DecisionRequest,
        verdict: &PolicyVerdict,
    ) -> Result<DecisionReport, AegisError> {
        let outcome = self.decisions.make_decision(request)?;
        if !(0.0..=1.0).contains(&outcome.confidence) {
            return Err(AegisError::Collaborator(format!(
                "decision source returned confidence {} outside [0, 1]",
                outcome.confidence
            )));
        }

        trace.confidence = outcome.confidence;
        trace.finish(Some(outcome.selected_option.clone()));
        self.decision_count += 1;

        let mut observation_context = JsonMap::new();
        observation_context.insert("goal".to_string(), json!(request.goal));
        observation_context.insert("reasoning".to_string(), json!(outcome.reasoning));
        let observation = Observation {
            timestamp: utcnow(),
            source: "decision_engine".to_string(),
            content: format!("Made decision: {}", outcome.selected_option),
            context: observation_context,
        };
        if let Err(e) = self.identity.store_observation(observation) {
            warn!(trace_id = %trace.trace_id, error = %e, "observation not stored");
        }
        self.affect.update_affect(
            &format!("decision_made_{}", outcome.selected_option),
            DECISION_STIMULUS_INTENSITY,
        );
        info!(trace_id = %trace.trace_id, option = %outcome.selected_option, "decision approved");

        Ok(DecisionReport {
            trace_id: trace.trace_id.clone(),
            status: DecisionStatus::Approved,
            policy_action: verdict.action,
            decision: Some(outcome.selected_option),
            reasoning: Some(outcome.reasoning),
            confidence: Some(outcome.confidence),
            message: verdict.message.clone(),
            flags: verdict.flags.clone(),
            conditions: verdict.conditions.clone(),
        })
    }

    fn notify(&self, goal: &str, report: &DecisionReport) {
        let payload = json!({"trace_id": report.trace_id, "goal": goal, "result": report});
        match self.bus.publish(topics::DECISION_MADE, payload) {
            Ok(delivered) => debug!(trace_id = %report.trace_id, delivered, "decision announced"),
            Err(e) => debug!(trace_id = %report.trace_id, error = %e, "decision not announced"),
        }
    }

    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            maturity_level: self.maturity_level,
            mental_health: self.mental_health,
            pmx_affect: self.affect.get_affect_snapshot(),
            identity: self.identity.get_identity_snapshot(),
            decision_count: self.decision_count,
            bus_running: self.bus.is_running(),
            logger_running: self.logger.is_running(),
        }
    }

    pub fn set_maturity_level(&mut self, level: u8) -> Result<(), AegisError> {
        check_maturity(level)?;
        info!(from = self.maturity_level, to = level, "maturity level changed");
        self.maturity_level = level;
        Ok(())
    }

    pub fn set_mental_health(&mut self, score: f64) -> Result<(), AegisError> {
        check_mental_health(score)?;
        info!(from = self.mental_health, to = score, "mental health changed");
        self.mental_health = score;
        Ok(())
    }

    /// The last `limit` persisted traces, oldest first.
    ///
    /// Traces still queued in a running logger are not visible yet.
    pub fn history(&self, limit: usize) -> Result<Vec<DecisionTrace>, AegisError> {
        let records = self.store.read_jsonl(&self.config.trace_log)?;
        let skip = records.len().saturating_sub(limit);
        records
            .into_iter()
            .skip(skip)
            .map(|record| serde_json::from_value(record).map_err(AegisError::from))
            .collect()
    }

    /// Rotate the trace log with the configured limits.
    pub fn rotate_traces(&self) -> Result<Option<PathBuf>, AegisError> {
        self.store.rotate(
            &self.config.trace_log,
            self.config.rotate_max_mb,
            self.config.rotate_max_files,
        )
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn logger(&self) -> &TraceLogger {
        &self.logger
    }

    pub fn store(&self) -> &Arc<LocalJsonlStore> {
        &self.store
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }
}

fn check_maturity(level: u8) -> Result<(), AegisError> {
    if level > MAX_MATURITY_LEVEL {
        return Err(AegisError::Configuration(format!(
            "maturity level {level} exceeds {MAX_MATURITY_LEVEL}"
        )));
    }
    Ok(())
}

fn check_mental_health(score: f64) -> Result<(), AegisError> {
    if !score.is_finite() || !(0.0..=1.0).contains(&score) {
        return Err(AegisError::Configuration(format!(
            "mental health {score} must lie in [0, 1]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::DecisionOutcome;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FixedAffect {
        snapshot: AffectSnapshot,
        stimuli: Arc<Mutex<Vec<String>>>,
    }

    impl AffectSource for FixedAffect {
        fn get_affect_snapshot(&self) -> AffectSnapshot {
            self.snapshot.clone()
        }

        fn update_affect(&mut self, stimulus: &str, _intensity: f64) -> AffectSnapshot {
            self.stimuli.lock().unwrap().push(stimulus.to_string());
            self.snapshot.clone()
        }
    }

    #[derive(Default)]
    struct NoIdentity;

    impl IdentitySource for NoIdentity {
        fn get_identity_snapshot(&self) -> IdentitySnapshot {
            IdentitySnapshot {
                constraints: vec!["Do no harm".to_string()],
                ..IdentitySnapshot::default()
            }
        }

        fn store_observation(&mut self, _observation: Observation) -> Result<String, AegisError> {
            Err(AegisError::Collaborator("observation log offline".to_string()))
        }
    }

    struct Scripted {
        confidence: f64,
        calls: Arc<Mutex<usize>>,
    }

    impl DecisionSource for Scripted {
        fn make_decision(&mut self, request: &DecisionRequest) -> Result<DecisionOutcome, AegisError> {
            *self.calls.lock().unwrap() += 1;
            Ok(DecisionOutcome {
                request_id: request.request_id.clone(),
                selected_option: "balanced_approach".to_string(),
                reasoning: "test".to_string(),
                confidence: self.confidence,
                execution_plan: Vec::new(),
            })
        }
    }

    fn governor(
        dir: &std::path::Path,
        confidence: f64,
    ) -> (Governor, Arc<Mutex<usize>>, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(0));
        let affect = FixedAffect::default();
        let stimuli = affect.stimuli.clone();
        let config = GovernorConfig {
            state_path: dir.to_path_buf(),
            ..GovernorConfig::default()
        };
        let governor = Governor::new(
            config,
            Box::new(affect),
            Box::new(NoIdentity),
            Box::new(Scripted {
                confidence,
                calls: calls.clone(),
            }),
        )
        .unwrap();
        (governor, calls, stimuli)
    }

    #[test]
    fn default_config_matches_stock_agent() {
        let config = GovernorConfig::default();
        assert_eq!(config.maturity_level, 6);
        assert_eq!(config.mental_health, 0.85);
        assert_eq!(config.compute_budget, 1000);
        assert_eq!(config.time_budget_ms, 5000);
    }

    #[test]
    fn invalid_starting_state_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = GovernorConfig {
            state_path: dir.path().to_path_buf(),
            maturity_level: 11,
            ..GovernorConfig::default()
        };
        let result = Governor::new(
            config,
            Box::new(FixedAffect::default()),
            Box::new(NoIdentity),
            Box::new(Scripted {
                confidence: 0.5,
                calls: Arc::default(),
            }),
        );
        assert!(matches!(result, Err(AegisError::Configuration(_))));
    }

    #[test]
    fn approved_decision_consults_collaborators() {
        let dir = tempfile::tempdir().unwrap();
        let (mut governor, calls, stimuli) = governor(dir.path(), 0.7);

        let report = governor.make_decision("Choose lunch option", JsonMap::new()).unwrap();
        assert!(report.is_approved());
        assert_eq!(report.decision.as_deref(), Some("balanced_approach"));
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(stimuli.lock().unwrap().as_slice(), ["decision_made_balanced_approach"]);
        assert_eq!(governor.system_status().decision_count, 1);

        // Logger never started: the trace was written synchronously.
        let history = governor.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].selected.as_deref(), Some("balanced_approach"));
        assert_eq!(history[0].constraints, vec!["Do no harm".to_string()]);
        assert_eq!(history[0].confidence, 0.7);
    }

    #[test]
    fn blocked_decision_never_reaches_decision_source() {
        let dir = tempfile::tempdir().unwrap();
        let (mut governor, calls, stimuli) = governor(dir.path(), 0.7);
        governor.set_mental_health(0.3).unwrap();

        let report = governor.make_decision("Choose lunch option", JsonMap::new()).unwrap();
        assert_eq!(report.status, DecisionStatus::Blocked);
        assert_eq!(report.policy_action, PolicyAction::Warn);
        assert!(report.decision.is_none());
        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(stimuli.lock().unwrap().is_empty());

        let history = governor.history(1).unwrap();
        assert!(history[0].selected.is_none());
        assert!(history[0].finished_at.is_some());
        assert!(history[0].policy_flags.contains(&PolicyFlag::MentalHealthRisk));
    }

    #[test]
    fn bad_collaborator_confidence_is_reported_and_audited() {
        let dir = tempfile::tempdir().unwrap();
        let (mut governor, _, _) = governor(dir.path(), 1.5);

        let err = governor.make_decision("Choose lunch option", JsonMap::new()).unwrap_err();
        assert!(matches!(err, AegisError::Collaborator(_)));
        assert_eq!(governor.history(10).unwrap().len(), 1);
        assert_eq!(governor.system_status().decision_count, 0);
    }

    #[test]
    fn setters_validate_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let (mut governor, _, _) = governor(dir.path(), 0.7);
        assert!(governor.set_maturity_level(11).is_err());
        assert!(governor.set_mental_health(-0.1).is_err());
        assert!(governor.set_mental_health(f64::NAN).is_err());
        governor.set_maturity_level(10).unwrap();
        governor.set_mental_health(1.0).unwrap();
        let status = governor.system_status();
        assert_eq!((status.maturity_level, status.mental_health), (10, 1.0));
    }

    #[test]
    fn history_returns_most_recent_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (mut governor, _, _) = governor(dir.path(), 0.7);
        for goal in ["first plan", "second plan", "third plan"] {
            governor.make_decision(goal, JsonMap::new()).unwrap();
        }
        let goals: Vec<String> = governor.history(2).unwrap().into_iter().map(|t| t.goal).collect();
        assert_eq!(goals, ["second plan", "third plan"]);
    }

    #[test]
    fn report_serializes_status_lowercase() {
        let verdict = PolicyVerdict::deny(PolicyFlag::MaturityGate, "too young");
        let value = serde_json::to_value(DecisionReport::blocked("t-1", &verdict)).unwrap();
        assert_eq!(value["status"], "blocked");
        assert_eq!(value["policy_action"], "DENY");
        assert_eq!(value["flags"], json!(["MATURITY_GATE"]));
    }
}
