//! Shared data model for the Aegis governance layer.
//!
//! - [`trace`] – [`DecisionTrace`], the audit record that flows through the
//!   policy chain and into the trace log, plus its validating [`TraceBuilder`].
//! - [`verdict`] – [`PolicyVerdict`] and the severity-ordered [`PolicyAction`].
//! - [`event`] – [`Event`], the ephemeral envelope routed by the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod event;
pub mod trace;
pub mod verdict;

pub use event::Event;
pub use trace::{DecisionTrace, DecodingMode, TraceBuilder, MAX_MATURITY_LEVEL};
pub use verdict::{PolicyAction, PolicyFlag, PolicyVerdict};

/// Free-form string-keyed JSON object used for trace context and conditions.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// Generate a fresh, globally unique trace identifier.
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current wall-clock time in UTC.
pub fn utcnow() -> DateTime<Utc> {
    Utc::now()
}

/// Error type shared by every Aegis crate.
///
/// Policy review never produces one of these: a structurally valid trace
/// always yields a verdict.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AegisError {
    /// Invalid thresholds or limits supplied when building a policy.
    #[error("Configuration Error: {0}")]
    Configuration(String),

    /// A lifecycle-managed component was used before `start()` or after `stop()`.
    #[error("{0} not started")]
    NotStarted(String),

    /// A value could not be represented in the persisted JSON format.
    #[error("Serialization Error: {0}")]
    Serialization(String),

    /// A disk operation failed.
    #[error("Storage I/O Error at {path}: {details}")]
    StorageIo { path: String, details: String },

    /// A trace failed construction-time validation.
    #[error("Invalid Decision Trace: {0}")]
    InvalidTrace(String),

    /// A store key or log name is empty, absolute, or escapes the base directory.
    #[error("Invalid Store Name: {0}")]
    InvalidName(String),

    /// An external collaborator (affect, identity, decision source) failed.
    #[error("Collaborator Error: {0}")]
    Collaborator(String),
}

impl AegisError {
    /// Build a [`AegisError::StorageIo`] from an I/O error and the path involved.
    pub fn storage(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        AegisError::StorageIo {
            path: path.as_ref().display().to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AegisError {
    fn from(err: serde_json::Error) -> Self {
        AegisError::Serialization(err.to_string())
    }
}
