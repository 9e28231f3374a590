//! # Failure Taxonomy
//!
//! Typed failures for the agent runtime. Nothing here is fatal to the
//! process: scan failures and rejected plans surface as metrics and log
//! lines while both agent loops keep running. Soft conditions (resource
//! conflicts, dependency cycles) are reported as data, not as errors.

use thiserror::Error;

/// Failures raised inside the agent loops
#[derive(Debug, Error)]
pub enum AgentError {
    /// A scan cycle failed; the loop continues at the next interval.
    #[error("scan cycle failed: {0}")]
    ScanFailure(String),

    /// A constructed plan failed validation and was discarded.
    #[error("plan validation failed: {reason}")]
    PlanValidationFailure { reason: String },

    /// A status update referenced a plan this agent does not know.
    #[error("unknown plan reference: {plan_id}")]
    UnknownPlanReference { plan_id: String },
}
