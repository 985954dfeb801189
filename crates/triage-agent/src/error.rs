//! Error types for agent execution.

use thiserror::Error;

/// Errors raised while configuring the agent.
///
/// A failing or hanging agent process is not an error here; it is reported
/// through [`crate::AgentExit`].
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent executable name is empty.
    #[error("Agent program is not set")]
    MissingProgram,

    /// The timeout must be positive.
    #[error("Agent timeout must be greater than zero")]
    ZeroTimeout,

    /// Model identifier is blank.
    #[error("Model identifier is empty")]
    EmptyModel,
}
