//! Transient per-item execution context.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::{BacklogItem, CoreError, IssueNumber, JobState, TaskResult};

/// Execution record for one backlog item within one orchestrator run.
///
/// Lives only for the duration of a run; nothing here is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationJob {
    /// The item being triaged.
    pub item: BacklogItem,

    /// Current state.
    pub state: JobState,

    /// When the job was dispatched.
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,

    /// Why the job failed, or what went wrong with the agent process even
    /// though a result was recovered.
    pub error: Option<String>,

    /// Result recovered for the item.
    pub result: Option<TaskResult>,
}

impl OrchestrationJob {
    /// Create a pending job for an item.
    pub fn new(item: BacklogItem) -> Self {
        Self {
            item,
            state: JobState::Pending,
            started_at: None,
            finished_at: None,
            error: None,
            result: None,
        }
    }

    pub fn number(&self) -> IssueNumber {
        self.item.number
    }

    /// Mark the job as started.
    pub fn start(&mut self) -> Result<(), CoreError> {
        self.transition(JobState::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the job as served from the cache.
    pub fn cached(&mut self, result: TaskResult) -> Result<(), CoreError> {
        self.finish(JobState::Cached)?;
        self.result = Some(result);
        Ok(())
    }

    /// Mark the job as succeeded. `warning` carries a non-fatal process error.
    pub fn succeed(&mut self, result: TaskResult, warning: Option<String>) -> Result<(), CoreError> {
        self.finish(JobState::Succeeded)?;
        self.result = Some(result);
        self.error = warning;
        Ok(())
    }

    /// Mark the job as failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.finish(JobState::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Mark the job as timed out.
    pub fn time_out(&mut self, error: impl Into<String>) -> Result<(), CoreError> {
        self.finish(JobState::TimedOut)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Wall-clock time between start and finish, if both are known.
    pub fn duration(&self) -> Option<Duration> {
        let (start, end) = (self.started_at?, self.finished_at?);
        (end - start).to_std().ok()
    }

    fn finish(&mut self, to: JobState) -> Result<(), CoreError> {
        self.transition(to)?;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, to: JobState) -> Result<(), CoreError> {
        let allowed = match (self.state, to) {
            (JobState::Pending, JobState::Running) => true,
            (JobState::Running, next) => next.is_terminal(),
            _ => false,
        };
        if !allowed {
            return Err(CoreError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}
