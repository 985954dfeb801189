//! Ephemeral sandbox that installs dependencies and compiles one snippet.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::deps::{detect_dependencies, manifest};
use crate::{SandboxConfig, SandboxError, VerificationVerdict};

/// Diagnostics reported for a clean compile that printed nothing.
pub const EMPTY_OUTPUT_PLACEHOLDER: &str = "Compilation successful (no output)";

const EMITTER_CONFIG_FILE: &str = "tspconfig.yaml";
const MANIFEST_FILE: &str = "package.json";
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Verify a snippet in a fresh sandbox.
///
/// `input` is read as a file when it names an existing path and used as
/// literal source otherwise. The sandbox directory is gone by the time this
/// returns, whatever the outcome.
pub async fn verify(
    config: &SandboxConfig,
    input: &str,
    emitter: Option<&str>,
) -> Result<VerificationVerdict, SandboxError> {
    let source = resolve_source(input).await?;
    let emitter = emitter.map(str::trim).filter(|e| !e.is_empty());

    let sandbox = Sandbox::create(config)?;
    let verdict = sandbox.check(&source, emitter).await;
    sandbox.close();
    verdict
}

/// Best-effort compiler version, run from the current directory.
pub async fn compiler_version(config: &SandboxConfig) -> Option<String> {
    let cwd = std::env::current_dir().ok()?;
    match run_step(
        &config.compiler_program,
        &config.version_args,
        &cwd,
        VERSION_PROBE_TIMEOUT,
    )
    .await
    {
        StepOutcome::Exited(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .last()
                .map(|l| l.trim_start_matches("Version").trim_start_matches(':').trim().to_string())
        }
        other => {
            debug!(outcome = ?other.describe(), "Compiler version probe failed");
            None
        }
    }
}

async fn resolve_source(input: &str) -> Result<String, SandboxError> {
    if input.trim().is_empty() {
        return Err(SandboxError::EmptySource);
    }

    let path = Path::new(input);
    let source = if path.is_file() {
        debug!(path = %path.display(), "Reading source from file");
        tokio::fs::read_to_string(path).await?
    } else {
        input.to_string()
    };

    if source.trim().is_empty() {
        return Err(SandboxError::EmptySource);
    }
    Ok(source)
}

/// A uniquely named project directory, removed when dropped.
pub struct Sandbox<'a> {
    config: &'a SandboxConfig,
    temp_dir: TempDir,
}

impl<'a> Sandbox<'a> {
    /// Create an empty sandbox under the configured parent directory.
    pub fn create(config: &'a SandboxConfig) -> Result<Self, SandboxError> {
        let prefix = format!(
            "triage-sandbox-{}-{}-",
            Utc::now().format("%Y%m%d%H%M%S%3f"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let temp_dir = match &config.parent_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };

        debug!(path = %temp_dir.path().display(), "Created sandbox");
        Ok(Self { config, temp_dir })
    }

    /// Root of the sandbox project.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Remove the sandbox now, logging instead of failing if removal breaks.
    pub fn close(self) {
        let path = self.root().to_path_buf();
        if let Err(e) = self.temp_dir.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove sandbox");
        }
    }

    async fn check(
        &self,
        source: &str,
        emitter: Option<&str>,
    ) -> Result<VerificationVerdict, SandboxError> {
        self.prepare(source, emitter).await?;

        if let Some(failed) = self.install().await {
            return Ok(failed);
        }

        let verdict = self.compile(emitter.is_some()).await;
        if emitter.is_some() {
            return Ok(verdict.with_emitter_output(self.collect_emitter_output()));
        }
        Ok(verdict)
    }

    /// Write the snippet, manifest, and emitter config.
    pub async fn prepare(&self, source: &str, emitter: Option<&str>) -> Result<(), SandboxError> {
        let root = self.root();
        tokio::fs::write(root.join(&self.config.source_file), source).await?;

        let detected = detect_dependencies(source);
        info!(dependencies = ?detected, emitter = ?emitter, "Detected dependencies");

        let manifest = manifest(self.config, &detected, emitter);
        tokio::fs::write(root.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?).await?;

        if let Some(emitter) = emitter {
            let config = emitter_config(emitter, &self.config.output_dir)?;
            tokio::fs::write(root.join(EMITTER_CONFIG_FILE), config).await?;
        }
        Ok(())
    }

    /// Install manifest dependencies. Returns a terminal verdict on failure.
    pub async fn install(&self) -> Option<VerificationVerdict> {
        let outcome = run_step(
            &self.config.install_program,
            &self.config.install_args,
            self.root(),
            self.config.install_timeout,
        )
        .await;

        let diagnostics = match outcome {
            StepOutcome::Exited(output) if output.status.success() => {
                debug!("Dependencies installed");
                return None;
            }
            StepOutcome::Exited(output) => format!(
                "Install failed (exit code {}):\n{}",
                exit_code(&output),
                combined_output(&output)
            ),
            StepOutcome::TimedOut => format!(
                "Install failed: timed out after {:?}",
                self.config.install_timeout
            ),
            StepOutcome::SpawnFailed(e) => format!(
                "Install failed: could not start `{}`: {e}",
                self.config.install_program
            ),
        };

        warn!(diagnostics = %first_line(&diagnostics), "Dependency install failed");
        Some(VerificationVerdict::failure(-1, diagnostics))
    }

    /// Run the compiler against the snippet, or the whole project when an
    /// emitter config is present.
    pub async fn compile(&self, with_emitter_config: bool) -> VerificationVerdict {
        let target = if with_emitter_config {
            ".".to_string()
        } else {
            self.config.source_file.clone()
        };
        let mut args = self.config.compiler_args.clone();
        args.push(target);

        match run_step(
            &self.config.compiler_program,
            &args,
            self.root(),
            self.config.compile_timeout,
        )
        .await
        {
            StepOutcome::Exited(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                info!("Compilation succeeded");
                if stdout.trim().is_empty() {
                    VerificationVerdict::success(EMPTY_OUTPUT_PLACEHOLDER)
                } else {
                    VerificationVerdict::success(stdout)
                }
            }
            StepOutcome::Exited(output) => {
                let code = exit_code(&output);
                info!(exit_code = code, "Compilation failed");
                VerificationVerdict::failure(code, combined_output(&output))
            }
            StepOutcome::TimedOut => VerificationVerdict::failure(
                -1,
                format!(
                    "Compile timed out after {:?}",
                    self.config.compile_timeout
                ),
            ),
            StepOutcome::SpawnFailed(e) => VerificationVerdict::failure(
                -1,
                format!(
                    "Could not start compiler `{}`: {e}",
                    self.config.compiler_program
                ),
            ),
        }
    }

    /// Text files under the emitter output directory, keyed by relative path.
    ///
    /// Oversized, binary, and unreadable files are skipped.
    pub fn collect_emitter_output(&self) -> BTreeMap<String, String> {
        let out_dir = self.root().join(&self.config.output_dir);
        let mut files = BTreeMap::new();
        if !out_dir.is_dir() {
            return files;
        }

        for entry in WalkDir::new(&out_dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&out_dir) else {
                continue;
            };
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                debug!(path = %entry.path().display(), "Skipping unreadable emitter output");
                continue;
            };
            if content.chars().count() >= self.config.max_output_chars {
                debug!(path = %relative.display(), "Skipping oversized emitter output");
                continue;
            }
            files.insert(relative_key(relative), content);
        }
        files
    }
}

/// `tspconfig.yaml` body. Values are written as JSON strings, which YAML
/// reads as double-quoted scalars with the same escapes.
fn emitter_config(emitter: &str, output_dir: &str) -> Result<String, SandboxError> {
    Ok(format!(
        "emit:\n  - {}\noutput-dir: {}\n",
        serde_json::to_string(emitter)?,
        serde_json::to_string(&format!("{{project-root}}/{output_dir}"))?
    ))
}

fn relative_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug)]
enum StepOutcome {
    Exited(Output),
    TimedOut,
    SpawnFailed(std::io::Error),
}

impl StepOutcome {
    fn describe(&self) -> String {
        match self {
            Self::Exited(output) => format!("exit code {}", exit_code(output)),
            Self::TimedOut => "timed out".to_string(),
            Self::SpawnFailed(e) => format!("spawn failed: {e}"),
        }
    }
}

/// Run one step to completion. The step runs in its own process group, and
/// the whole group is killed once it exits or the limit expires.
async fn run_step(program: &str, args: &[String], cwd: &Path, limit: Duration) -> StepOutcome {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    debug!(program = %program, args = ?args, cwd = %cwd.display(), "Running sandbox step");

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return StepOutcome::SpawnFailed(e),
    };
    let pid = child.id();

    let outcome = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => StepOutcome::Exited(output),
        Ok(Err(e)) => StepOutcome::SpawnFailed(e),
        Err(_) => {
            warn!(program = %program, limit_secs = limit.as_secs(), "Sandbox step timed out");
            StepOutcome::TimedOut
        }
    };
    kill_process_group(pid);
    outcome
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

fn exit_code(output: &Output) -> i32 {
    output.status.code().unwrap_or(-1)
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
