//! Per-item triage outcome as written by the external agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::IssueNumber;

/// What kind of report the backlog item turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Bug,
    FeatureRequest,
    DocsBug,
    Unknown,
}

impl Category {
    /// Every category, in report order.
    pub const ALL: [Category; 4] = [
        Category::Bug,
        Category::FeatureRequest,
        Category::DocsBug,
        Category::Unknown,
    ];

    /// Wire name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::FeatureRequest => "feature-request",
            Self::DocsBug => "docs-bug",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a usable reproduction exists for the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReproStatus {
    /// The reporter supplied a reproduction.
    HasRepro,
    /// A reproduction is needed but none was given.
    Missing,
    /// The agent wrote a reproduction itself.
    Generated,
    /// The agent tried and could not reproduce.
    UnableToRepro,
    /// Reproduction does not apply (feature requests, docs).
    NotApplicable,
}

impl ReproStatus {
    /// Every status, in report order.
    pub const ALL: [ReproStatus; 5] = [
        ReproStatus::HasRepro,
        ReproStatus::Missing,
        ReproStatus::Generated,
        ReproStatus::UnableToRepro,
        ReproStatus::NotApplicable,
    ];

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasRepro => "has-repro",
            Self::Missing => "missing",
            Self::Generated => "generated",
            Self::UnableToRepro => "unable-to-repro",
            Self::NotApplicable => "not-applicable",
        }
    }
}

impl fmt::Display for ReproStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of compiling the reproduction against the current compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationStatus {
    /// The reported problem still shows up.
    StillReproduces,
    /// The reproduction now compiles cleanly: the bug is gone.
    Fixed,
    /// The sandbox could not decide (install failure, unrelated errors).
    Inconclusive,
}

impl VerificationStatus {
    /// Every status, in report order.
    pub const ALL: [VerificationStatus; 3] = [
        VerificationStatus::StillReproduces,
        VerificationStatus::Fixed,
        VerificationStatus::Inconclusive,
    ];

    /// Bucket name used for items that were never verified.
    pub const NOT_VERIFIED: &'static str = "not-verified";

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StillReproduces => "still-reproduces",
            Self::Fixed => "fixed",
            Self::Inconclusive => "inconclusive",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input/output token counters reported by the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> u64 {
        self.input.saturating_add(self.output)
    }

    /// Counter-wise sum, pinned at `u64::MAX` rather than wrapping.
    pub fn saturating_add(self, other: Self) -> Self {
        Self::new(
            self.input.saturating_add(other.input),
            self.output.saturating_add(other.output),
        )
    }

    pub fn is_zero(&self) -> bool {
        self.input == 0 && self.output == 0
    }
}

/// Per-item outcome record.
///
/// Field names follow the JSON document the agent is told to write, so the
/// same struct is the cache schema and the report entry payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub number: IssueNumber,

    pub title: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub labels: Vec<String>,

    pub category: Category,

    pub repro_status: ReproStatus,

    /// Where the reproduction came from (issue body, comment, agent).
    #[serde(default)]
    pub repro_source: Option<String>,

    #[serde(default)]
    pub repro_code: Option<String>,

    /// Emitter packages the reproduction needs. Accepts a single string too.
    #[serde(default, deserialize_with = "one_or_many")]
    pub emitter: Vec<String>,

    #[serde(default)]
    pub compiler_options: Option<serde_json::Value>,

    #[serde(default)]
    pub verification: Option<VerificationStatus>,

    /// Diagnostics captured when the reproduction was compiled.
    #[serde(default)]
    pub compiler_output: Option<String>,

    #[serde(default)]
    pub suggested_action: Option<String>,

    #[serde(default)]
    pub playground_link: Option<String>,

    #[serde(default)]
    pub repro_description: Option<String>,

    /// Area label the agent thinks the item belongs to.
    #[serde(default)]
    pub suggested_area: Option<String>,

    #[serde(default)]
    pub token_usage: Option<TokenUsage>,

    #[serde(default)]
    pub triage_duration_seconds: Option<f64>,

    #[serde(default)]
    pub model: Option<String>,
}

impl TaskResult {
    /// Create a minimal result for an item.
    pub fn new(
        number: impl Into<IssueNumber>,
        title: impl Into<String>,
        category: Category,
        repro_status: ReproStatus,
    ) -> Self {
        Self {
            number: number.into(),
            title: title.into(),
            url: String::new(),
            author: String::new(),
            created_at: None,
            labels: Vec::new(),
            category,
            repro_status,
            repro_source: None,
            repro_code: None,
            emitter: Vec::new(),
            compiler_options: None,
            verification: None,
            compiler_output: None,
            suggested_action: None,
            playground_link: None,
            repro_description: None,
            suggested_area: None,
            token_usage: None,
            triage_duration_seconds: None,
            model: None,
        }
    }

    /// True when the token counters are absent or all zero.
    pub fn lacks_token_usage(&self) -> bool {
        self.token_usage.map_or(true, |u| u.is_zero())
    }

    /// True when no positive duration was recorded.
    pub fn lacks_duration(&self) -> bool {
        self.triage_duration_seconds.map_or(true, |d| d <= 0.0)
    }

    /// Reproduction source, if non-blank.
    pub fn repro_code(&self) -> Option<&str> {
        self.repro_code
            .as_deref()
            .filter(|code| !code.trim().is_empty())
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) if s.trim().is_empty() => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v.into_iter().filter(|s| !s.trim().is_empty()).collect(),
    })
}
