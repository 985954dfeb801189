//! Backlog item as delivered by the issue tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, IssueNumber};

/// One unit of triage work.
///
/// Produced once by the tracker collaborator and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BacklogItem {
    /// Tracker-assigned number.
    pub number: IssueNumber,

    /// Issue title.
    pub title: String,

    /// Link to the issue.
    pub url: String,

    /// Login of whoever opened the issue.
    pub author: String,

    /// When the issue was opened.
    pub created_at: DateTime<Utc>,

    /// Label names currently applied.
    pub labels: Vec<String>,

    /// Issue body.
    pub body: String,

    /// Comment bodies, oldest first.
    pub comments: Vec<String>,
}

impl BacklogItem {
    /// Create a new BacklogItem with no labels, body, or comments.
    pub fn new(number: impl Into<IssueNumber>, title: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            title: title.into(),
            url: String::new(),
            author: String::new(),
            created_at: Utc::now(),
            labels: Vec::new(),
            body: String::new(),
            comments: Vec::new(),
        }
    }

    /// Builder method to set the url.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Builder method to set the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Builder method to add a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Builder method to set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Builder method to append a comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comments.push(comment.into());
        self
    }

    /// Whether the item carries the given label (exact match).
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    /// Check the fields the pipeline cannot work without.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.number.get() == 0 {
            return Err(CoreError::InvalidItem {
                number: 0,
                reason: "issue number must be positive".to_string(),
            });
        }
        if self.title.trim().is_empty() {
            return Err(CoreError::InvalidItem {
                number: self.number.get(),
                reason: "title is empty".to_string(),
            });
        }
        Ok(())
    }
}
