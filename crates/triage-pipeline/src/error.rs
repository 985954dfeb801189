//! Pipeline error types.

use std::path::PathBuf;

use thiserror::Error;
use triage_agent::AgentError;
use triage_core::CoreError;

/// Errors that abort a pipeline operation.
///
/// Agent and compiler failures for a single item never show up here; they
/// are recorded on that item's job.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid run configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backlog could not be retrieved.
    #[error("Backlog source failed: {0}")]
    Backlog(String),

    /// A prompt template could not be loaded.
    #[error("Failed to read template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Domain validation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Agent configuration rejected.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tempfile::PersistError> for PipelineError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Io(err.error)
    }
}
