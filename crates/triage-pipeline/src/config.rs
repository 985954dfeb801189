//! Run configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use triage_core::{Category, IssueNumber, SortOrder};
use triage_sandbox::SandboxConfig;

use crate::cache::TaskCache;
use crate::error::PipelineError;

/// Immutable configuration for one pipeline invocation.
///
/// Built once at startup and shared by reference; no component reads
/// paths or label lists from anywhere else.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Repository checkout the agent works in.
    pub project_root: PathBuf,

    /// One `{number}.json` per triaged item.
    pub results_dir: PathBuf,

    /// One `{number}.md` brief per item, regenerated every run.
    pub prompts_dir: PathBuf,

    /// Where the aggregate report is written.
    pub report_path: PathBuf,

    /// Brief template override. The built-in template is used when unset.
    pub template_path: Option<PathBuf>,

    /// Agent CLI executable.
    pub agent_program: String,

    /// Arguments placed before the standard agent arguments.
    pub agent_args: Vec<String>,

    /// Model identifier handed to the agent.
    pub model: String,

    /// Wall-clock limit per agent invocation.
    pub agent_timeout: Duration,

    /// Items dispatched per batch.
    pub concurrency: usize,

    /// `owner/name` used in suggested commands.
    pub repo: String,

    /// Label prefixes that mark an area label (`compiler:`, `emitter:`, ...).
    pub area_prefixes: Vec<String>,

    /// Label each category should carry.
    pub category_labels: HashMap<Category, String>,

    /// Base URL of the playground used for share links.
    pub playground_url: String,

    /// Command the agent runs to verify a reproduction.
    pub verify_command: String,

    /// Report entry order.
    pub sort_order: SortOrder,

    /// Emit JSON progress lines on stdout.
    pub json_progress: bool,

    /// Sandbox settings, used here for the compiler version probe.
    pub sandbox: SandboxConfig,
}

impl TriageConfig {
    /// Configuration rooted at a project directory, with default layout.
    pub fn for_root(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            results_dir: project_root.join("triage-results"),
            prompts_dir: project_root.join("triage-prompts"),
            report_path: project_root.join("triage-report.json"),
            project_root,
            template_path: None,
            agent_program: "copilot".to_string(),
            agent_args: Vec::new(),
            model: "claude-sonnet-4".to_string(),
            agent_timeout: Duration::from_secs(600),
            concurrency: 1,
            repo: "microsoft/typespec".to_string(),
            area_prefixes: ["compiler:", "emitter:", "lib:", "ide"]
                .into_iter()
                .map(String::from)
                .collect(),
            category_labels: default_category_labels(),
            playground_url: "https://typespec.io/playground".to_string(),
            verify_command: "verify-repro".to_string(),
            sort_order: SortOrder::Descending,
            json_progress: false,
            sandbox: SandboxConfig::default(),
        }
    }

    /// Reject settings no run could work with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.concurrency == 0 {
            return Err(PipelineError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.agent_timeout.is_zero() {
            return Err(PipelineError::Config(
                "agent timeout must be greater than zero".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(PipelineError::Config("model must not be empty".to_string()));
        }
        if !self.repo.contains('/') {
            return Err(PipelineError::Config(format!(
                "repository '{}' is not in owner/name form",
                self.repo
            )));
        }
        Ok(())
    }

    /// Result cache over `results_dir`.
    pub fn cache(&self) -> TaskCache {
        TaskCache::new(&self.results_dir)
    }

    /// Brief file of an item.
    pub fn prompt_path(&self, number: IssueNumber) -> PathBuf {
        self.prompts_dir.join(format!("{number}.md"))
    }

    /// Whether a label is an area label.
    pub fn is_area_label(&self, label: &str) -> bool {
        self.area_prefixes.iter().any(|p| label.starts_with(p.as_str()))
    }

    pub fn category_label(&self, category: Category) -> Option<&str> {
        self.category_labels.get(&category).map(String::as_str)
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self::for_root(".")
    }
}

fn default_category_labels() -> HashMap<Category, String> {
    HashMap::from([
        (Category::Bug, "bug".to_string()),
        (Category::FeatureRequest, "feature".to_string()),
        (Category::DocsBug, "docs".to_string()),
    ])
}
