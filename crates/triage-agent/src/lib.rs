//! External triage agent execution.
//!
//! This crate spawns one agent process per backlog item, enforces a
//! wall-clock timeout, captures combined output, and extracts token usage
//! from whatever the agent printed.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use triage_agent::{AgentExecutor, AgentInvocation, AgentLauncher, PermissionMode};
//! use triage_core::IssueNumber;
//!
//! async fn run_agent() {
//!     let executor = AgentExecutor::new("copilot")
//!         .with_model("claude-sonnet-4")
//!         .with_permission_mode(PermissionMode::AllowAll)
//!         .with_timeout(Duration::from_secs(600));
//!
//!     let invocation = AgentInvocation {
//!         issue: IssueNumber::new(42),
//!         prompt_file: "prompts/42.md".into(),
//!         result_path: "results/42.json".into(),
//!         working_dir: ".".into(),
//!     };
//!
//!     let run = executor.launch(&invocation).await;
//!     println!("exit: {}", run.exit);
//! }
//! ```

mod error;
mod executor;
mod launcher;
mod usage;

pub use error::AgentError;
pub use executor::{AgentExecutor, PermissionMode};
pub use launcher::{AgentExit, AgentInvocation, AgentLauncher, AgentRun};
pub use usage::parse_token_usage;
