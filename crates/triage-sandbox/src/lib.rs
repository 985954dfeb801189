//! Ephemeral verification sandbox.
//!
//! Compiles an untrusted reproduction in a throwaway project directory and
//! reports a structured [`VerificationVerdict`]. The directory is removed on
//! every exit path.
//!
//! # Example
//!
//! ```rust,no_run
//! use triage_sandbox::{verify, SandboxConfig};
//!
//! async fn check() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SandboxConfig::default();
//!     let verdict = verify(&config, "model Pet { name: string; }", None).await?;
//!     println!("success = {}", verdict.success);
//!     Ok(())
//! }
//! ```

mod builder;
mod config;
mod deps;
mod error;

pub use builder::{compiler_version, verify, Sandbox, EMPTY_OUTPUT_PLACEHOLDER};
pub use config::SandboxConfig;
pub use deps::{detect_dependencies, manifest};
pub use error::SandboxError;
pub use triage_core::VerificationVerdict;
