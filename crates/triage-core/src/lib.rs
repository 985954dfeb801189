//! Issue Triage Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Process spawning
//! - Filesystem layout
//! - Runtime specifics
//!
//! Everything here describes what flows through the triage pipeline:
//! backlog items going in, per-item results coming out, and the
//! aggregate report built from them.

pub mod error;
pub mod ids;
pub mod issue;
pub mod job;
pub mod report;
pub mod result;
pub mod status;
pub mod verdict;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{IssueNumber, RunId};
pub use issue::BacklogItem;
pub use job::OrchestrationJob;
pub use report::{
    ActionKind, AggregateReport, ReportEntry, ReportSummary, SortOrder, SuggestedAction, Timing,
};
pub use result::{Category, ReproStatus, TaskResult, TokenUsage, VerificationStatus};
pub use status::JobState;
pub use verdict::VerificationVerdict;
