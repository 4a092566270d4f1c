//! Thresholds and limits for the governance chain.
//!
//! Every field has a stock default, so a partial TOML or JSON document only
//! overrides what it names:
//!
//! ```toml
//! risk_threshold = 0.5
//!
//! [maturity_thresholds]
//! financial = 8
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::maturity_gate::default_thresholds;
use crate::mental_health::{DEFAULT_CRITICAL_THRESHOLD, DEFAULT_RISK_THRESHOLD};
use crate::pmx_boundary::default_limits;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub risk_threshold: f64,
    pub critical_threshold: f64,
    /// Category → minimum maturity level.
    pub maturity_thresholds: BTreeMap<String, u8>,
    /// Emotion → maximum tolerated intensity.
    pub affect_limits: BTreeMap<String, f64>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            risk_threshold: DEFAULT_RISK_THRESHOLD,
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
            maturity_thresholds: default_thresholds(),
            affect_limits: default_limits(),
        }
    }
}
