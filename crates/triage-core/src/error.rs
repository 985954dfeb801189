//! Core domain errors.

use thiserror::Error;

/// Core domain errors for issue triage.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A backlog item is missing data the pipeline needs.
    #[error("Invalid backlog item #{number}: {reason}")]
    InvalidItem { number: u64, reason: String },

    /// Invalid state transition on an orchestration job.
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
