//! Launcher seam between the pipeline and the agent process.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use triage_core::{IssueNumber, TokenUsage};

/// Everything an agent needs to triage one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvocation {
    pub issue: IssueNumber,

    /// Rendered task brief.
    pub prompt_file: PathBuf,

    /// Where the agent must write its JSON result.
    pub result_path: PathBuf,

    /// Directory the agent runs in.
    pub working_dir: PathBuf,
}

/// How the agent process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentExit {
    /// Process exited on its own. Killed-by-signal maps to -1.
    Exited(i32),

    /// Process was killed after exceeding its limit.
    TimedOut(Duration),

    /// Process never started or could not be waited on.
    Failed(String),
}

impl AgentExit {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    /// Description of the exit condition, `None` for a clean exit.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Exited(0) => None,
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for AgentExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(0) => write!(f, "agent exited successfully"),
            Self::Exited(code) => write!(f, "agent exited with code {code}"),
            Self::TimedOut(limit) => write!(f, "agent timed out after {}s", limit.as_secs()),
            Self::Failed(reason) => write!(f, "agent failed: {reason}"),
        }
    }
}

/// What came back from one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub exit: AgentExit,

    /// Interleaved stdout and stderr.
    pub output: String,

    /// Wall-clock time from spawn to exit (or kill).
    pub duration: Duration,

    /// Counters found in the output, if any.
    pub token_usage: Option<TokenUsage>,
}

/// Starts the external agent for one item.
///
/// Implementations must never return early on failure: every outcome,
/// including timeouts, is folded into [`AgentRun`].
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn launch(&self, invocation: &AgentInvocation) -> AgentRun;

    /// Model identifier passed to the agent, if any.
    fn model(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_messages() {
        assert!(AgentExit::Exited(0).error_message().is_none());
        assert_eq!(
            AgentExit::Exited(2).error_message().as_deref(),
            Some("agent exited with code 2")
        );
        assert_eq!(
            AgentExit::TimedOut(Duration::from_secs(600)).error_message().as_deref(),
            Some("agent timed out after 600s")
        );
        assert!(AgentExit::TimedOut(Duration::from_secs(1)).is_timeout());
        assert!(!AgentExit::Failed("not found".into()).is_success());
    }
}
