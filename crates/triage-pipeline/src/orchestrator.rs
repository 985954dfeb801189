//! Concurrency orchestrator.
//!
//! The backlog is cut into sequential batches of `concurrency` items. Items in
//! a batch run as independent tasks, and the next batch starts only when
//! every member of the current one has settled.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{error, warn};
use triage_core::{BacklogItem, IssueNumber, JobState, OrchestrationJob, RunId};

use crate::brief::reset_prompts_dir;
use crate::config::TriageConfig;
use crate::error::PipelineError;
use crate::progress::ProgressReporter;
use crate::runner::AgentRunner;

/// Outcome of one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: RunId,

    /// Every job, keyed by issue number.
    pub jobs: BTreeMap<IssueNumber, OrchestrationJob>,

    pub cached: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl RunSummary {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            jobs: BTreeMap::new(),
            cached: 0,
            succeeded: 0,
            failed: 0,
            timed_out: 0,
        }
    }

    fn record(&mut self, job: OrchestrationJob) {
        match job.state {
            JobState::Cached => self.cached += 1,
            JobState::Succeeded => self.succeeded += 1,
            JobState::Failed => self.failed += 1,
            JobState::TimedOut => self.timed_out += 1,
            JobState::Pending | JobState::Running => {
                warn!(issue = %job.number(), state = %job.state, "Job recorded before settling");
            }
        }
        self.jobs.insert(job.number(), job);
    }

    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn job(&self, number: IssueNumber) -> Option<&OrchestrationJob> {
        self.jobs.get(&number)
    }

    /// Items that ended without a result.
    pub fn unresolved(&self) -> Vec<IssueNumber> {
        self.jobs
            .values()
            .filter(|job| !job.state.has_result())
            .map(OrchestrationJob::number)
            .collect()
    }
}

/// Drives the agent runner over a whole backlog.
pub struct Orchestrator {
    config: Arc<TriageConfig>,
    runner: AgentRunner,
    progress: ProgressReporter,
}

impl Orchestrator {
    pub fn new(config: Arc<TriageConfig>, runner: AgentRunner, progress: ProgressReporter) -> Self {
        Self {
            config,
            runner,
            progress,
        }
    }

    /// Triage every item. Per-item failures are recorded, never returned.
    pub async fn run(&self, items: Vec<BacklogItem>) -> Result<RunSummary, PipelineError> {
        self.config.validate()?;
        reset_prompts_dir(&self.config)?;
        std::fs::create_dir_all(&self.config.results_dir)?;

        let items = dedupe(items);
        let run_id = RunId::generate();
        let concurrency = self.config.concurrency;
        let batches: Vec<&[BacklogItem]> = items.chunks(concurrency).collect();

        self.progress.run_started(&run_id, items.len(), concurrency);
        let mut summary = RunSummary::new(run_id);

        for (index, batch) in batches.iter().enumerate() {
            let numbers: Vec<IssueNumber> = batch.iter().map(|item| item.number).collect();
            self.progress.batch_started(index, batches.len(), &numbers);

            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|item| {
                    let runner = self.runner.clone();
                    let progress = self.progress.clone();
                    progress.job_started(item.number);
                    let spawned = item.clone();
                    let handle = tokio::spawn(async move {
                        let job = runner.run(spawned).await;
                        progress.job_finished(&job);
                        job
                    });
                    (item, handle)
                })
                .collect();

            for (item, handle) in handles {
                let job = match handle.await {
                    Ok(job) => job,
                    Err(e) => {
                        error!(issue = %item.number, error = %e, "Job task aborted");
                        let job = crashed_job(item, &e.to_string());
                        self.progress.job_finished(&job);
                        job
                    }
                };
                summary.record(job);
            }
        }

        self.progress.run_finished(&summary.run_id, &summary);
        Ok(summary)
    }
}

fn crashed_job(item: BacklogItem, reason: &str) -> OrchestrationJob {
    let mut job = OrchestrationJob::new(item);
    let recorded = job
        .start()
        .and_then(|()| job.fail(format!("job crashed: {reason}")));
    if let Err(e) = recorded {
        error!(issue = %job.number(), error = %e, "Could not record crashed job");
    }
    job
}

/// Keep the first occurrence of each issue number.
fn dedupe(items: Vec<BacklogItem>) -> Vec<BacklogItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(item.number);
            if !fresh {
                warn!(issue = %item.number, "Duplicate backlog item ignored");
            }
            fresh
        })
        .collect()
}
