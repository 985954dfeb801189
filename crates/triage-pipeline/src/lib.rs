//! Issue triage pipeline.
//!
//! Two operations make up a triage pass:
//!
//! - [`Orchestrator::run`] dispatches the external agent over the backlog in
//!   batches, skipping items that already have a cached result.
//! - [`aggregate`] rebuilds the consolidated report from whatever results are
//!   cached, independently of any run.
//!
//! The `triage` binary composes them.

pub mod actions;
pub mod aggregate;
pub mod backlog;
pub mod brief;
pub mod cache;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod playground;
pub mod progress;
pub mod report;
pub mod runner;

pub use actions::suggest_actions;
pub use aggregate::aggregate;
pub use backlog::{select, BacklogSource, GhCliBacklog, JsonFileBacklog};
pub use brief::{load_template, render_brief, BriefContext, DEFAULT_TEMPLATE};
pub use cache::TaskCache;
pub use config::TriageConfig;
pub use error::PipelineError;
pub use orchestrator::{Orchestrator, RunSummary};
pub use playground::playground_link;
pub use progress::ProgressReporter;
pub use report::write_report;
pub use runner::AgentRunner;
