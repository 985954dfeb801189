//! Progress events for operators.
//!
//! Every event goes to `tracing`. In JSON mode each event is also written as
//! one line to stdout (or a supplied writer) for tools that follow a run.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use triage_core::{IssueNumber, JobState, OrchestrationJob, RunId};

use crate::orchestrator::RunSummary;

/// Event types that can be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    RunStarted,
    BatchStarted,
    JobStarted,
    JobFinished,
    RunFinished,
}

/// One JSON progress line.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub event: ProgressEventType,
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl ProgressEvent {
    /// Create a new event with the current timestamp.
    pub fn new(event: ProgressEventType, data: serde_json::Value) -> Self {
        Self {
            event,
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }
}

type Sink = Arc<Mutex<dyn Write + Send>>;

/// Reports job lifecycle as it happens. Cheap to clone.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    sink: Option<Sink>,
}

impl ProgressReporter {
    /// Logging only.
    pub fn new() -> Self {
        Self { sink: None }
    }

    /// Logging plus JSON lines on stdout.
    pub fn json_stdout() -> Self {
        let stdout: Sink = Arc::new(Mutex::new(io::stdout()));
        Self { sink: Some(stdout) }
    }

    /// Logging plus JSON lines on the given writer.
    pub fn json_writer(writer: Sink) -> Self {
        Self { sink: Some(writer) }
    }

    pub fn is_json(&self) -> bool {
        self.sink.is_some()
    }

    pub fn run_started(&self, run_id: &RunId, items: usize, concurrency: usize) {
        info!(run_id = %run_id, items, concurrency, "Triage run started");
        self.emit(
            ProgressEventType::RunStarted,
            json!({ "run_id": run_id, "items": items, "concurrency": concurrency }),
        );
    }

    pub fn batch_started(&self, index: usize, batches: usize, numbers: &[IssueNumber]) {
        info!(batch = index + 1, batches, issues = ?numbers, "Dispatching batch");
        self.emit(
            ProgressEventType::BatchStarted,
            json!({ "batch": index + 1, "batches": batches, "issues": numbers }),
        );
    }

    pub fn job_started(&self, number: IssueNumber) {
        info!(issue = %number, "Job started");
        self.emit(ProgressEventType::JobStarted, json!({ "issue": number }));
    }

    pub fn job_finished(&self, job: &OrchestrationJob) {
        let duration_secs = job.duration().map(|d| d.as_secs_f64());
        match job.state {
            JobState::Cached | JobState::Succeeded => info!(
                issue = %job.number(),
                state = %job.state,
                duration_secs = ?duration_secs,
                warning = ?job.error,
                "Job finished"
            ),
            _ => warn!(
                issue = %job.number(),
                state = %job.state,
                duration_secs = ?duration_secs,
                error = ?job.error,
                "Job finished without a result"
            ),
        }
        self.emit(
            ProgressEventType::JobFinished,
            json!({
                "issue": job.number(),
                "state": job.state,
                "error": job.error,
                "duration_secs": duration_secs,
            }),
        );
    }

    pub fn run_finished(&self, run_id: &RunId, summary: &RunSummary) {
        info!(
            run_id = %run_id,
            cached = summary.cached,
            succeeded = summary.succeeded,
            failed = summary.failed,
            timed_out = summary.timed_out,
            "Triage run finished"
        );
        self.emit(
            ProgressEventType::RunFinished,
            json!({
                "run_id": run_id,
                "cached": summary.cached,
                "succeeded": summary.succeeded,
                "failed": summary.failed,
                "timed_out": summary.timed_out,
            }),
        );
    }

    fn emit(&self, event: ProgressEventType, data: serde_json::Value) {
        let Some(sink) = &self.sink else {
            return;
        };
        let event = ProgressEvent::new(event, data);
        if let (Ok(line), Ok(mut out)) = (serde_json::to_string(&event), sink.lock()) {
            let _ = writeln!(out, "{line}");
            let _ = out.flush();
        }
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("json", &self.is_json())
            .finish()
    }
}
