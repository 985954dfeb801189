//! Agent runner: exactly one result for exactly one backlog item.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use triage_agent::{AgentInvocation, AgentLauncher, AgentRun};
use triage_core::{BacklogItem, OrchestrationJob, TaskResult};

use crate::brief::write_brief;
use crate::cache::TaskCache;
use crate::config::TriageConfig;

/// How a job ended, before it is recorded on the job.
#[derive(Debug)]
enum Outcome {
    Cached(TaskResult),
    Succeeded(TaskResult, Option<String>),
    Failed(String),
    TimedOut(String),
}

/// Runs the agent for single items, consulting the cache first.
#[derive(Clone)]
pub struct AgentRunner {
    config: Arc<TriageConfig>,
    launcher: Arc<dyn AgentLauncher>,
    cache: TaskCache,
    template: Arc<str>,
}

impl AgentRunner {
    pub fn new(
        config: Arc<TriageConfig>,
        launcher: Arc<dyn AgentLauncher>,
        template: impl Into<Arc<str>>,
    ) -> Self {
        let cache = config.cache();
        Self {
            config,
            launcher,
            cache,
            template: template.into(),
        }
    }

    pub fn cache(&self) -> &TaskCache {
        &self.cache
    }

    /// Triage one item. Never fails: every outcome is recorded on the job.
    pub async fn run(&self, item: BacklogItem) -> OrchestrationJob {
        let mut job = OrchestrationJob::new(item);
        if let Err(e) = job.start() {
            error!(issue = %job.number(), error = %e, "Job could not start");
            return job;
        }

        let outcome = self.execute(&job.item).await;
        let recorded = match outcome {
            Outcome::Cached(result) => job.cached(result),
            Outcome::Succeeded(result, warning) => job.succeed(result, warning),
            Outcome::Failed(msg) => job.fail(msg),
            Outcome::TimedOut(msg) => job.time_out(msg),
        };
        if let Err(e) = recorded {
            error!(issue = %job.number(), error = %e, "Job outcome could not be recorded");
        }
        job
    }

    async fn execute(&self, item: &BacklogItem) -> Outcome {
        let number = item.number;

        if let Err(e) = item.validate() {
            warn!(issue = %number, error = %e, "Skipping invalid backlog item");
            return Outcome::Failed(e.to_string());
        }

        if let Some(result) = self.cache.get(number) {
            debug!(issue = %number, "Cache hit");
            return Outcome::Cached(result);
        }

        let prompt_file = match write_brief(&self.config, &self.template, item) {
            Ok(path) => path,
            Err(e) => return Outcome::Failed(format!("could not write task brief: {e}")),
        };
        if let Err(e) = std::fs::create_dir_all(self.cache.dir()) {
            return Outcome::Failed(format!("could not create results directory: {e}"));
        }

        let invocation = AgentInvocation {
            issue: number,
            prompt_file,
            result_path: self.cache.path(number),
            working_dir: self.config.project_root.clone(),
        };
        let run = self.launcher.launch(&invocation).await;
        let exit_error = run.exit.error_message();
        if let Some(err) = &exit_error {
            warn!(issue = %number, error = %err, "Agent did not exit cleanly, looking for a result anyway");
        }

        // A result written before a kill is accepted if it parses.
        let Some(mut result) = self.cache.get(number) else {
            let msg = match &exit_error {
                Some(err) => format!("no result produced ({err})"),
                None => "no result produced".to_string(),
            };
            return if run.exit.is_timeout() {
                Outcome::TimedOut(msg)
            } else {
                Outcome::Failed(msg)
            };
        };

        let model = self.launcher.model().unwrap_or(self.config.model.as_str());
        if backfill(&mut result, &run, model) {
            match self.cache.put(&result) {
                Ok(()) => debug!(issue = %number, "Backfilled result rewritten"),
                Err(e) => warn!(issue = %number, error = %e, "Could not rewrite backfilled result"),
            }
        }

        info!(
            issue = %number,
            category = %result.category,
            repro_status = %result.repro_status,
            "Result recovered"
        );
        Outcome::Succeeded(result, exit_error)
    }
}

/// Fill fields the agent left out with what the runner observed.
///
/// Returns true when anything changed.
pub fn backfill(result: &mut TaskResult, run: &AgentRun, model: &str) -> bool {
    let mut changed = false;

    if result.lacks_token_usage() {
        if let Some(usage) = run.token_usage.filter(|u| !u.is_zero()) {
            result.token_usage = Some(usage);
            changed = true;
        }
    }

    let measured = run.duration.as_secs_f64();
    if result.lacks_duration() && measured > 0.0 {
        result.triage_duration_seconds = Some(measured);
        changed = true;
    }

    if result.model.as_deref().map_or(true, |m| m.trim().is_empty()) && !model.is_empty() {
        result.model = Some(model.to_string());
        changed = true;
    }

    changed
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use triage_agent::AgentExit;
    use triage_core::{Category, IssueNumber, JobState, ReproStatus, TokenUsage};

    /// What the fake agent does for one issue.
    #[derive(Clone)]
    pub(crate) struct Script {
        pub write: Option<String>,
        pub exit: AgentExit,
        pub delay: Duration,
        pub token_usage: Option<TokenUsage>,
    }

    impl Script {
        pub fn writes(result: &TaskResult) -> Self {
            Self {
                write: Some(serde_json::to_string(result).unwrap()),
                exit: AgentExit::Exited(0),
                delay: Duration::ZERO,
                token_usage: None,
            }
        }

        pub fn times_out(after: Duration) -> Self {
            Self {
                write: None,
                exit: AgentExit::TimedOut(after),
                delay: after,
                token_usage: None,
            }
        }
    }

    /// In-process launcher that follows a script per issue and counts calls.
    #[derive(Default)]
    pub(crate) struct FakeLauncher {
        pub scripts: Mutex<HashMap<IssueNumber, Script>>,
        pub calls: AtomicUsize,
    }

    impl FakeLauncher {
        pub fn with(scripts: Vec<(u64, Script)>) -> Self {
            Self {
                scripts: Mutex::new(
                    scripts
                        .into_iter()
                        .map(|(n, s)| (IssueNumber::new(n), s))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AgentLauncher for FakeLauncher {
        async fn launch(&self, invocation: &AgentInvocation) -> AgentRun {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(invocation.prompt_file.exists(), "brief written before launch");

            let script = self
                .scripts
                .lock()
                .unwrap()
                .get(&invocation.issue)
                .cloned()
                .unwrap_or_else(|| Script {
                    write: None,
                    exit: AgentExit::Exited(1),
                    delay: Duration::ZERO,
                    token_usage: None,
                });

            tokio::time::sleep(script.delay).await;
            if let Some(json) = &script.write {
                std::fs::write(&invocation.result_path, json).unwrap();
            }
            AgentRun {
                exit: script.exit,
                output: String::new(),
                duration: script.delay.max(Duration::from_millis(5)),
                token_usage: script.token_usage,
            }
        }

        fn model(&self) -> Option<&str> {
            Some("fake-model")
        }
    }

    pub(crate) fn item(number: u64) -> BacklogItem {
        BacklogItem::new(number, format!("Issue {number}")).with_label("bug")
    }

    pub(crate) fn result(number: u64) -> TaskResult {
        TaskResult::new(number, format!("Issue {number}"), Category::Bug, ReproStatus::HasRepro)
    }

    fn runner(dir: &TempDir, launcher: Arc<FakeLauncher>) -> AgentRunner {
        let config = Arc::new(TriageConfig::for_root(dir.path()));
        AgentRunner::new(config, launcher, "brief {{number}}")
    }

    #[tokio::test]
    async fn test_second_run_is_a_cache_hit() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(FakeLauncher::with(vec![(7, Script::writes(&result(7)))]));
        let runner = runner(&dir, launcher.clone());

        let first = runner.run(item(7)).await;
        assert_eq!(first.state, JobState::Succeeded);
        assert_eq!(launcher.calls(), 1);

        let second = runner.run(item(7)).await;
        assert_eq!(second.state, JobState::Cached);
        assert_eq!(launcher.calls(), 1);
        assert_eq!(first.result, second.result);
    }

    /// Writes its result wherever the brief says to.
    struct BriefFollower;

    #[async_trait]
    impl AgentLauncher for BriefFollower {
        async fn launch(&self, invocation: &AgentInvocation) -> AgentRun {
            let target = std::fs::read_to_string(&invocation.prompt_file).unwrap();
            let json = serde_json::to_string(&result(invocation.issue.get())).unwrap();
            std::fs::write(target.trim(), json).unwrap();
            AgentRun {
                exit: AgentExit::Exited(0),
                output: String::new(),
                duration: Duration::from_millis(5),
                token_usage: None,
            }
        }
    }

    #[tokio::test]
    async fn test_brief_points_at_the_cache_entry() {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(TriageConfig::for_root(dir.path()));
        let runner = AgentRunner::new(config.clone(), Arc::new(BriefFollower), "{{resultPath}}");

        let job = runner.run(item(31)).await;

        assert_eq!(job.state, JobState::Succeeded);
        assert!(config.cache().get(IssueNumber::new(31)).is_some());
    }

    #[tokio::test]
    async fn test_backfills_and_rewrites_cache() {
        let dir = TempDir::new().unwrap();
        let mut script = Script::writes(&result(3));
        script.token_usage = Some(TokenUsage::new(1200, 300));
        let launcher = Arc::new(FakeLauncher::with(vec![(3, script)]));
        let runner = runner(&dir, launcher);

        let job = runner.run(item(3)).await;
        let recovered = job.result.unwrap();
        assert_eq!(recovered.token_usage, Some(TokenUsage::new(1200, 300)));
        assert_eq!(recovered.model.as_deref(), Some("fake-model"));
        assert!(recovered.triage_duration_seconds.unwrap() > 0.0);

        let on_disk = runner.cache().get(IssueNumber::new(3)).unwrap();
        assert_eq!(on_disk, recovered);
    }

    #[tokio::test]
    async fn test_agent_values_win_over_backfill() {
        let dir = TempDir::new().unwrap();
        let mut written = result(4);
        written.token_usage = Some(TokenUsage::new(10, 2));
        written.model = Some("agent-model".to_string());
        let mut script = Script::writes(&written);
        script.token_usage = Some(TokenUsage::new(999, 999));
        let runner = runner(&dir, Arc::new(FakeLauncher::with(vec![(4, script)])));

        let recovered = runner.run(item(4)).await.result.unwrap();
        assert_eq!(recovered.token_usage, Some(TokenUsage::new(10, 2)));
        assert_eq!(recovered.model.as_deref(), Some("agent-model"));
    }

    #[tokio::test]
    async fn test_no_result_fails() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir, Arc::new(FakeLauncher::default()));

        let job = runner.run(item(5)).await;
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(
            job.error.as_deref(),
            Some("no result produced (agent exited with code 1)")
        );
    }

    #[tokio::test]
    async fn test_timeout_without_result() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(FakeLauncher::with(vec![(
            6,
            Script::times_out(Duration::from_millis(20)),
        )]));
        let job = runner(&dir, launcher).run(item(6)).await;

        assert_eq!(job.state, JobState::TimedOut);
        assert!(job.error.unwrap().starts_with("no result produced (agent timed out"));
    }

    #[tokio::test]
    async fn test_result_written_before_kill_is_kept() {
        let dir = TempDir::new().unwrap();
        let mut script = Script::writes(&result(8));
        script.exit = AgentExit::TimedOut(Duration::from_secs(600));
        let job = runner(&dir, Arc::new(FakeLauncher::with(vec![(8, script)])))
            .run(item(8))
            .await;

        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(job.error.as_deref(), Some("agent timed out after 600s"));
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_redone() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(FakeLauncher::with(vec![(9, Script::writes(&result(9)))]));
        let runner = runner(&dir, launcher.clone());
        std::fs::create_dir_all(runner.cache().dir()).unwrap();
        std::fs::write(runner.cache().path(IssueNumber::new(9)), "{\"number\": 9").unwrap();

        let job = runner.run(item(9)).await;
        assert_eq!(job.state, JobState::Succeeded);
        assert_eq!(launcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_item_never_spawns() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(FakeLauncher::default());
        let job = runner(&dir, launcher.clone())
            .run(BacklogItem::new(10, " "))
            .await;

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(launcher.calls(), 0);
    }

    #[test]
    fn test_backfill_only_fills_gaps() {
        let run = AgentRun {
            exit: AgentExit::Exited(0),
            output: String::new(),
            duration: Duration::from_secs(42),
            token_usage: Some(TokenUsage::new(5, 1)),
        };

        let mut r = result(1);
        r.token_usage = Some(TokenUsage::new(0, 0));
        r.triage_duration_seconds = Some(0.0);
        assert!(backfill(&mut r, &run, "m"));
        assert_eq!(r.token_usage, Some(TokenUsage::new(5, 1)));
        assert_eq!(r.triage_duration_seconds, Some(42.0));
        assert_eq!(r.model.as_deref(), Some("m"));

        assert!(!backfill(&mut r, &run, "other"));
    }
}
