//! Error types for the public goods engine
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

use crate::stage::Stage;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
///
/// Every variant is terminal for the request that produced it. The barrier's
/// "still waiting on peers" condition is a successful outcome, not an error.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation invoked while the participant is in the wrong stage
    #[error("Stage violation: cannot {operation} while in stage '{actual}' (requires '{expected}')")]
    StageViolation {
        /// Operation that was attempted
        operation: &'static str,
        /// Stage the operation requires
        expected: Stage,
        /// Stage the participant is actually in
        actual: Stage,
    },

    /// Rejected input (caller may resubmit)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown record id
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Record kind ("experiment" or "participant")
        kind: &'static str,
        /// Requested id
        id: String,
    },

    /// Creation passcode did not match
    #[error("Unauthorized: wrong passcode")]
    Unauthorized,

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Record encode/decode failure (includes unknown stage values)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A per-round history length invariant failed after a mutation
    #[error("Invariant violation: {0}\nThe write was aborted. Please report this issue.")]
    InvariantViolation(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a missing experiment.
    pub(crate) fn experiment_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "experiment",
            id: id.to_string(),
        }
    }

    /// Shorthand for a missing participant.
    pub(crate) fn participant_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "participant",
            id: id.to_string(),
        }
    }
}
