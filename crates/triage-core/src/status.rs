//! Status of an orchestration job.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one per-item job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    /// Job created but not yet dispatched.
    #[default]
    Pending,
    /// Agent process running.
    Running,
    /// A usable cache entry existed; no process was spawned.
    Cached,
    /// The agent produced a parseable result.
    Succeeded,
    /// No result was produced.
    Failed,
    /// The agent hit its timeout and left no usable result.
    TimedOut,
}

impl JobState {
    /// Returns true if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Cached | Self::Succeeded | Self::Failed | Self::TimedOut
        )
    }

    /// Returns true if the job ended with a result available.
    pub fn has_result(&self) -> bool {
        matches!(self, Self::Cached | Self::Succeeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Cached => "cached",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
