//! Backlog sources.
//!
//! The tracker is an external collaborator: the pipeline only needs a list
//! of items. Both sources here understand the tracker's JSON export shape,
//! where authors, labels and comments may be objects or plain strings.

use std::path::PathBuf;
use std::process::Output;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};
use triage_core::{BacklogItem, IssueNumber};

use crate::error::PipelineError;

/// Where backlog items come from.
#[async_trait]
pub trait BacklogSource: Send + Sync {
    /// Retrieve every open item in scope. Failure aborts the run.
    async fn fetch(&self) -> Result<Vec<BacklogItem>, PipelineError>;
}

/// Items from a JSON export on disk.
#[derive(Debug, Clone)]
pub struct JsonFileBacklog {
    path: PathBuf,
    exclude_labels: Vec<String>,
}

impl JsonFileBacklog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exclude_labels: Vec::new(),
        }
    }

    pub fn with_excluded_labels(mut self, labels: Vec<String>) -> Self {
        self.exclude_labels = labels;
        self
    }
}

#[async_trait]
impl BacklogSource for JsonFileBacklog {
    async fn fetch(&self) -> Result<Vec<BacklogItem>, PipelineError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PipelineError::Backlog(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let items = exclude(parse_backlog(&raw)?, &self.exclude_labels);
        info!(path = %self.path.display(), count = items.len(), "Loaded backlog from file");
        Ok(items)
    }
}

/// Open issues listed through the GitHub CLI.
#[derive(Debug, Clone)]
pub struct GhCliBacklog {
    program: String,
    repo: String,
    limit: usize,
    exclude_labels: Vec<String>,
}

impl GhCliBacklog {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            program: "gh".to_string(),
            repo: repo.into(),
            limit: 500,
            exclude_labels: Vec::new(),
        }
    }

    /// Use a different `gh` executable.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_excluded_labels(mut self, labels: Vec<String>) -> Self {
        self.exclude_labels = labels;
        self
    }

    pub fn args(&self) -> Vec<String> {
        vec![
            "issue".to_string(),
            "list".to_string(),
            "--repo".to_string(),
            self.repo.clone(),
            "--state".to_string(),
            "open".to_string(),
            "--limit".to_string(),
            self.limit.to_string(),
            "--json".to_string(),
            "number,title,url,author,createdAt,labels,body,comments".to_string(),
        ]
    }

    fn command_failed(&self, output: &Output) -> PipelineError {
        PipelineError::Backlog(format!(
            "GitHub CLI command failed (`{} {}`): {}",
            self.program,
            self.args().join(" "),
            command_output_detail(output)
        ))
    }
}

#[async_trait]
impl BacklogSource for GhCliBacklog {
    async fn fetch(&self) -> Result<Vec<BacklogItem>, PipelineError> {
        debug!(program = %self.program, repo = %self.repo, "Listing open issues");

        let output = Command::new(&self.program)
            .args(self.args())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PipelineError::Backlog(format!(
                    "GitHub CLI `{}` was not found. Install gh and authenticate with `gh auth login`.",
                    self.program
                )),
                _ => PipelineError::Backlog(format!(
                    "failed to execute GitHub CLI `{}`: {e}",
                    self.program
                )),
            })?;

        if !output.status.success() {
            return Err(self.command_failed(&output));
        }

        let items = exclude(
            parse_backlog(&String::from_utf8_lossy(&output.stdout))?,
            &self.exclude_labels,
        );
        info!(repo = %self.repo, count = items.len(), "Fetched backlog from GitHub");
        Ok(items)
    }
}

fn command_output_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        return stderr.trim().to_string();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        return stdout.trim().to_string();
    }
    format!("exit status {}", output.status)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIssue {
    number: u64,
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    author: Option<RawAuthor>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    labels: Vec<RawLabel>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    comments: Vec<RawComment>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAuthor {
    Object { login: String },
    Login(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLabel {
    Object { name: String },
    Name(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawComment {
    Object { body: String },
    Body(String),
}

impl From<RawIssue> for BacklogItem {
    fn from(raw: RawIssue) -> Self {
        BacklogItem {
            number: IssueNumber::new(raw.number),
            title: raw.title,
            url: raw.url.unwrap_or_default(),
            author: match raw.author {
                Some(RawAuthor::Object { login }) | Some(RawAuthor::Login(login)) => login,
                None => String::new(),
            },
            created_at: raw.created_at.unwrap_or_else(Utc::now),
            labels: raw
                .labels
                .into_iter()
                .map(|l| match l {
                    RawLabel::Object { name } | RawLabel::Name(name) => name,
                })
                .collect(),
            body: raw.body.unwrap_or_default(),
            comments: raw
                .comments
                .into_iter()
                .map(|c| match c {
                    RawComment::Object { body } | RawComment::Body(body) => body,
                })
                .collect(),
        }
    }
}

/// Parse a tracker export (a JSON array of issues).
pub fn parse_backlog(json: &str) -> Result<Vec<BacklogItem>, PipelineError> {
    let raw: Vec<RawIssue> = serde_json::from_str(json)
        .map_err(|e| PipelineError::Backlog(format!("malformed issue list: {e}")))?;
    Ok(raw.into_iter().map(BacklogItem::from).collect())
}

/// Restrict a backlog to the given numbers. An empty selection keeps all.
pub fn select(items: Vec<BacklogItem>, only: &[IssueNumber]) -> Vec<BacklogItem> {
    if only.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| only.contains(&item.number))
        .collect()
}

fn exclude(items: Vec<BacklogItem>, labels: &[String]) -> Vec<BacklogItem> {
    if labels.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| !labels.iter().any(|l| item.has_label(l)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const GH_EXPORT: &str = r#"[
      {
        "number": 101,
        "title": "Crash in @doc",
        "url": "https://github.com/microsoft/typespec/issues/101",
        "author": {"login": "octocat", "is_bot": false},
        "createdAt": "2026-03-01T10:00:00Z",
        "labels": [{"id": "L1", "name": "bug", "color": "d73a4a"}],
        "body": "It crashes",
        "comments": [{"author": {"login": "x"}, "body": "me too"}]
      },
      {
        "number": 102,
        "title": "Docs typo",
        "author": "someone",
        "labels": ["docs", "wontfix"],
        "body": null,
        "comments": ["first"]
      }
    ]"#;

    #[test]
    fn test_parse_both_shapes() {
        let items = parse_backlog(GH_EXPORT).unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].author, "octocat");
        assert_eq!(items[0].labels, vec!["bug"]);
        assert_eq!(items[0].comments, vec!["me too"]);
        assert_eq!(items[0].created_at.to_rfc3339(), "2026-03-01T10:00:00+00:00");

        assert_eq!(items[1].author, "someone");
        assert_eq!(items[1].labels, vec!["docs", "wontfix"]);
        assert_eq!(items[1].body, "");
        assert_eq!(items[1].url, "");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_backlog("{\"number\": 1}"),
            Err(PipelineError::Backlog(_))
        ));
    }

    #[test]
    fn test_select_and_exclude() {
        let items = parse_backlog(GH_EXPORT).unwrap();
        assert_eq!(select(items.clone(), &[]).len(), 2);
        let only = select(items.clone(), &[IssueNumber::new(102)]);
        assert_eq!(only[0].number, IssueNumber::new(102));

        let kept = exclude(items, &["wontfix".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].number, IssueNumber::new(101));
    }

    #[tokio::test]
    async fn test_json_file_backlog() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issues.json");
        std::fs::write(&path, GH_EXPORT).unwrap();

        let source = JsonFileBacklog::new(&path).with_excluded_labels(vec!["docs".to_string()]);
        let items = source.fetch().await.unwrap();
        assert_eq!(items.len(), 1);

        let missing = JsonFileBacklog::new(dir.path().join("none.json"));
        assert!(missing.fetch().await.is_err());
    }

    #[test]
    fn test_gh_args() {
        let gh = GhCliBacklog::new("microsoft/typespec").with_limit(50);
        let args = gh.args();
        assert_eq!(&args[..2], ["issue", "list"]);
        assert!(args.windows(2).any(|w| w == ["--repo", "microsoft/typespec"]));
        assert!(args.windows(2).any(|w| w == ["--limit", "50"]));
        assert!(args.last().unwrap().contains("comments"));
    }

    fn fake_gh(dir: &TempDir, script: &str) -> String {
        let path = dir.path().join("gh");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn test_gh_backlog_parses_stdout() {
        let dir = TempDir::new().unwrap();
        let export = dir.path().join("export.json");
        std::fs::write(&export, GH_EXPORT).unwrap();
        let program = fake_gh(&dir, &format!("cat '{}'", export.display()));

        let items = GhCliBacklog::new("microsoft/typespec")
            .with_program(program)
            .with_excluded_labels(vec!["wontfix".to_string()])
            .fetch()
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Crash in @doc");
    }

    #[tokio::test]
    async fn test_gh_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let program = fake_gh(&dir, "echo 'HTTP 401: Bad credentials' >&2; exit 1");

        let err = GhCliBacklog::new("microsoft/typespec")
            .with_program(program)
            .fetch()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Bad credentials"));
    }

    #[tokio::test]
    async fn test_gh_not_installed() {
        let err = GhCliBacklog::new("microsoft/typespec")
            .with_program("definitely-not-gh")
            .fetch()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("was not found"));
    }
}
