//! Error types for the verification sandbox.
//!
//! Install and compile failures are not errors: they come back as a
//! non-success verdict. These variants cover bad input and a sandbox that
//! could not be set up at all.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    /// Source text (or the file it points to) is empty.
    #[error("Source is empty")]
    EmptySource,

    /// Failed to create or write into the sandbox directory.
    #[error("Sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to render the manifest.
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}
