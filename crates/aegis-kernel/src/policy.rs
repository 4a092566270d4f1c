//! [`Policy`] – a single rule evaluator in the governance chain.

use aegis_types::{DecisionTrace, PolicyVerdict};

/// One governance concern, evaluated against a trace.
///
/// Implementations must be total over valid traces: range checking belongs
/// to trace construction, so `review` always returns a verdict.
pub trait Policy: Send + Sync {
    /// Human-readable name used in log fields.
    fn name(&self) -> &str;

    /// Produce this policy's verdict for `trace`.
    fn review(&self, trace: &DecisionTrace) -> PolicyVerdict;
}
