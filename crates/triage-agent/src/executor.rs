//! Agent executor for running the triage agent via subprocess.
//!
//! One process per backlog item, one-shot mode: the agent gets a pointer to
//! the rendered brief, does its work, writes a result file, and exits.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::AgentError;
use crate::launcher::{AgentExit, AgentInvocation, AgentLauncher, AgentRun};
use crate::usage::parse_token_usage;

/// How long to keep reading output after the process group is gone. Bounds
/// the wait on a descendant that moved itself out of the group.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Tool permissions granted to the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PermissionMode {
    /// Agent asks before running tools.
    #[default]
    Default,
    /// Every tool allowed, file access scoped to the project root.
    AllowAll,
}

impl std::fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::AllowAll => write!(f, "allow-all"),
        }
    }
}

/// Executor for the external triage agent.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use triage_agent::{AgentExecutor, PermissionMode};
///
/// let executor = AgentExecutor::new("copilot")
///     .with_model("claude-sonnet-4")
///     .with_permission_mode(PermissionMode::AllowAll)
///     .with_timeout(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct AgentExecutor {
    /// Path to the agent CLI executable.
    program: String,

    /// Arguments placed before the standard ones.
    extra_args: Vec<String>,

    /// Permission mode to use.
    permission_mode: PermissionMode,

    /// Model to use (optional).
    model: Option<String>,

    /// Hard wall-clock limit per invocation.
    timeout: Duration,

    /// Additional environment variables.
    env_vars: Vec<(String, String)>,
}

impl AgentExecutor {
    /// Create a new executor for the given agent CLI.
    ///
    /// The path can be a bare name to use PATH lookup, or a full path.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
            permission_mode: PermissionMode::Default,
            model: None,
            timeout: Duration::from_secs(600),
            env_vars: Vec::new(),
        }
    }

    /// Set the permission mode.
    pub fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add arguments placed before the standard ones.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Reject configurations that could never run.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.program.trim().is_empty() {
            return Err(AgentError::MissingProgram);
        }
        if self.timeout.is_zero() {
            return Err(AgentError::ZeroTimeout);
        }
        if matches!(&self.model, Some(m) if m.trim().is_empty()) {
            return Err(AgentError::EmptyModel);
        }
        Ok(())
    }

    /// Full argument list for an invocation.
    pub fn args(&self, invocation: &AgentInvocation) -> Vec<String> {
        let mut args = self.extra_args.clone();

        args.push("-p".to_string());
        args.push(format!(
            "Read the task brief at {} and follow its instructions exactly.",
            invocation.prompt_file.display()
        ));

        if let Some(model) = &self.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if self.permission_mode == PermissionMode::AllowAll {
            args.push("--allow-all-tools".to_string());
            args.push("--add-dir".to_string());
            args.push(invocation.working_dir.display().to_string());
        }

        args
    }

    fn command(&self, invocation: &AgentInvocation) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args(invocation))
            .env("TRIAGE_PROMPT_FILE", &invocation.prompt_file)
            .env("TRIAGE_RESULT_PATH", &invocation.result_path)
            .env("TRIAGE_ISSUE", invocation.issue.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&invocation.working_dir)
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        cmd
    }

    /// Run the agent once for one item.
    pub async fn execute(&self, invocation: &AgentInvocation) -> AgentRun {
        info!(
            issue = %invocation.issue,
            program = %self.program,
            model = ?self.model,
            permission_mode = %self.permission_mode,
            timeout_secs = self.timeout.as_secs(),
            "Spawning agent process"
        );

        let started = Instant::now();
        let mut cmd = self.command(invocation);
        debug!("Full command: {:?}", cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(issue = %invocation.issue, error = %e, "Failed to spawn agent process");
                return AgentRun {
                    exit: AgentExit::Failed(format!("could not start `{}`: {e}", self.program)),
                    output: String::new(),
                    duration: started.elapsed(),
                    token_usage: None,
                };
            }
        };

        let pid = child.id();
        let output = Arc::new(Mutex::new(String::new()));
        let readers: Vec<JoinHandle<()>> = [
            child.stdout.take().map(|s| spawn_reader(s, output.clone(), "stdout")),
            child.stderr.take().map(|s| spawn_reader(s, output.clone(), "stderr")),
        ]
        .into_iter()
        .flatten()
        .collect();

        let exit = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => AgentExit::Exited(status.code().unwrap_or(-1)),
            Ok(Err(e)) => AgentExit::Failed(format!("wait failed: {e}")),
            Err(_) => {
                warn!(
                    issue = %invocation.issue,
                    timeout_secs = self.timeout.as_secs(),
                    "Agent timed out, killing process group"
                );
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    warn!(issue = %invocation.issue, error = %e, "Failed to kill agent process");
                }
                AgentExit::TimedOut(self.timeout)
            }
        };
        // Tools the agent started die with it.
        kill_process_group(pid);
        let duration = started.elapsed();

        for mut reader in readers {
            if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
                debug!(issue = %invocation.issue, "Output pipe still open, abandoning reader");
                reader.abort();
            }
        }

        let output = output
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default();
        let token_usage = parse_token_usage(&output);

        info!(
            issue = %invocation.issue,
            exit = %exit,
            duration_secs = duration.as_secs_f64(),
            output_len = output.len(),
            token_usage = ?token_usage,
            "Agent process finished"
        );

        AgentRun {
            exit,
            output,
            duration,
            token_usage,
        }
    }
}

impl Default for AgentExecutor {
    fn default() -> Self {
        Self::new("copilot")
    }
}

#[async_trait]
impl AgentLauncher for AgentExecutor {
    async fn launch(&self, invocation: &AgentInvocation) -> AgentRun {
        self.execute(invocation).await
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// SIGKILL whatever is left of the process group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(pgid, error = %e, "Failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn spawn_reader<R>(stream: R, sink: Arc<Mutex<String>>, name: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    trace!(stream = name, line = %text.trim_end(), "Agent output");
                    if let Ok(mut buf) = sink.lock() {
                        buf.push_str(&text);
                    }
                }
                Err(e) => {
                    warn!(stream = name, error = %e, "Error reading agent output");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use triage_core::{IssueNumber, TokenUsage};

    fn invocation(dir: &TempDir) -> AgentInvocation {
        AgentInvocation {
            issue: IssueNumber::new(42),
            prompt_file: dir.path().join("prompts/42.md"),
            result_path: dir.path().join("results/42.json"),
            working_dir: dir.path().to_path_buf(),
        }
    }

    fn sh(script: &str) -> AgentExecutor {
        AgentExecutor::new("sh").with_args(["-c", script])
    }

    #[test]
    fn test_executor_builder() {
        let executor = AgentExecutor::new("copilot")
            .with_model("claude-sonnet-4")
            .with_permission_mode(PermissionMode::AllowAll)
            .with_timeout(Duration::from_secs(30))
            .with_env("GH_TOKEN", "test-token");

        assert_eq!(executor.program, "copilot");
        assert_eq!(executor.model.as_deref(), Some("claude-sonnet-4"));
        assert_eq!(executor.permission_mode, PermissionMode::AllowAll);
        assert_eq!(executor.timeout(), Duration::from_secs(30));
        assert_eq!(executor.env_vars.len(), 1);
        assert!(executor.validate().is_ok());
    }

    #[test]
    fn test_default_executor() {
        let executor = AgentExecutor::default();
        assert_eq!(executor.program, "copilot");
        assert_eq!(executor.permission_mode, PermissionMode::Default);
        assert!(executor.model.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        assert!(matches!(
            AgentExecutor::new(" ").validate(),
            Err(AgentError::MissingProgram)
        ));
        assert!(matches!(
            AgentExecutor::new("copilot").with_timeout(Duration::ZERO).validate(),
            Err(AgentError::ZeroTimeout)
        ));
        assert!(matches!(
            AgentExecutor::new("copilot").with_model("").validate(),
            Err(AgentError::EmptyModel)
        ));
    }

    #[test]
    fn test_args_reference_brief_model_and_root() {
        let executor = AgentExecutor::new("copilot")
            .with_model("gpt-5")
            .with_permission_mode(PermissionMode::AllowAll);
        let inv = AgentInvocation {
            issue: IssueNumber::new(1),
            prompt_file: PathBuf::from("/repo/prompts/1.md"),
            result_path: PathBuf::from("/repo/results/1.json"),
            working_dir: PathBuf::from("/repo"),
        };

        let args = executor.args(&inv);
        assert_eq!(args[0], "-p");
        assert!(args[1].contains("/repo/prompts/1.md"));
        assert!(args.windows(2).any(|w| w == ["--model", "gpt-5"]));
        assert!(args.contains(&"--allow-all-tools".to_string()));
        assert!(args.windows(2).any(|w| w == ["--add-dir", "/repo"]));
    }

    #[test]
    fn test_default_mode_grants_nothing() {
        let dir = PathBuf::from("/repo");
        let inv = AgentInvocation {
            issue: IssueNumber::new(1),
            prompt_file: dir.join("p.md"),
            result_path: dir.join("r.json"),
            working_dir: dir,
        };
        let args = AgentExecutor::new("copilot").args(&inv);
        assert!(!args.contains(&"--allow-all-tools".to_string()));
        assert!(!args.contains(&"--model".to_string()));
    }

    #[tokio::test]
    async fn test_captures_combined_output_and_usage() {
        let dir = TempDir::new().unwrap();
        let executor = sh("echo working; echo 'warn: slow' >&2; echo '300 input tokens, 25 output tokens'");

        let run = executor.execute(&invocation(&dir)).await;

        assert!(run.exit.is_success());
        assert!(run.output.contains("working"));
        assert!(run.output.contains("warn: slow"));
        assert_eq!(run.token_usage, Some(TokenUsage::new(300, 25)));
    }

    #[tokio::test]
    async fn test_agent_sees_result_path_and_runs_in_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("results")).unwrap();
        let executor = sh(r#"echo "{}" > "$TRIAGE_RESULT_PATH"; pwd; echo "issue=$TRIAGE_ISSUE""#);

        let run = executor.execute(&invocation(&dir)).await;

        assert!(run.exit.is_success());
        assert!(dir.path().join("results/42.json").exists());
        assert!(run.output.contains("issue=42"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported_not_raised() {
        let dir = TempDir::new().unwrap();
        let run = sh("echo partial; exit 7").execute(&invocation(&dir)).await;

        assert_eq!(run.exit, AgentExit::Exited(7));
        assert!(run.output.contains("partial"));
        assert!(run.token_usage.is_none());
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let dir = TempDir::new().unwrap();
        let executor = sh("echo started; sleep 30").with_timeout(Duration::from_millis(300));

        let started = Instant::now();
        let run = executor.execute(&invocation(&dir)).await;

        assert!(run.exit.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(run.output.contains("started"));
    }

    #[tokio::test]
    async fn test_timeout_kills_tools_the_agent_started() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("tool-finished");
        let executor = sh(&format!("(sleep 1; touch '{}') & wait", marker.display()))
            .with_timeout(Duration::from_millis(300));

        let started = Instant::now();
        let run = executor.execute(&invocation(&dir)).await;

        assert!(run.exit.is_timeout());
        assert!(started.elapsed() < DRAIN_GRACE);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_a_failed_exit() {
        let dir = TempDir::new().unwrap();
        let run = AgentExecutor::new("definitely-not-an-agent-binary")
            .execute(&invocation(&dir))
            .await;

        assert!(matches!(run.exit, AgentExit::Failed(_)));
    }
}
