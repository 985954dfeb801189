//! Aggregate report types.
//!
//! The report is always rebuilt from the full set of cached results, so
//! these types carry no update methods beyond render-time sorting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::{CoreError, IssueNumber, TaskResult, TokenUsage};

/// Kind of follow-up a maintainer could take on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Close,
    Comment,
    Label,
}

/// One suggested follow-up, with the literal command that performs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub label: String,
    pub icon: String,
    pub command: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
}

/// A cached result plus the actions derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    #[serde(flatten)]
    pub result: TaskResult,
    pub actions: Vec<SuggestedAction>,
}

impl ReportEntry {
    pub fn number(&self) -> IssueNumber {
        self.result.number
    }
}

/// Counts grouped by category, reproduction status, and verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_issues: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_repro_status: BTreeMap<String, usize>,
    pub by_verification: BTreeMap<String, usize>,
}

/// Duration statistics over items that reported a positive duration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub timed_items: usize,
    pub total_seconds: f64,
    pub average_seconds: Option<f64>,
    pub min_seconds: Option<f64>,
    pub max_seconds: Option<f64>,
}

/// Order of report entries by issue number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl FromStr for SortOrder {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            other => Err(CoreError::InvalidInput(format!(
                "unknown sort order '{other}' (expected asc or desc)"
            ))),
        }
    }
}

/// The consolidated report consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub generated_at: DateTime<Utc>,
    pub compiler_version: Option<String>,
    pub model: String,
    pub timing: Timing,
    pub token_usage: TokenUsage,
    pub summary: ReportSummary,
    /// In-scope items with no cached result yet.
    pub untriaged: Vec<IssueNumber>,
    pub results: Vec<ReportEntry>,
}

impl AggregateReport {
    /// True when no item has a result.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Apply the render-time ordering to entries and untriaged numbers.
    pub fn sorted(mut self, order: SortOrder) -> Self {
        match order {
            SortOrder::Ascending => {
                self.results.sort_by_key(|e| e.number());
                self.untriaged.sort();
            }
            SortOrder::Descending => {
                self.results.sort_by_key(|e| std::cmp::Reverse(e.number()));
                self.untriaged.sort_by_key(|n| std::cmp::Reverse(*n));
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Category, ReproStatus};

    fn entry(n: u64) -> ReportEntry {
        ReportEntry {
            result: TaskResult::new(n, format!("issue {n}"), Category::Bug, ReproStatus::Missing),
            actions: Vec::new(),
        }
    }

    fn report(numbers: &[u64]) -> AggregateReport {
        AggregateReport {
            generated_at: Utc::now(),
            compiler_version: None,
            model: "m".to_string(),
            timing: Timing::default(),
            token_usage: TokenUsage::default(),
            summary: ReportSummary::default(),
            untriaged: vec![IssueNumber::new(2), IssueNumber::new(9)],
            results: numbers.iter().copied().map(entry).collect(),
        }
    }

    #[test]
    fn test_sorted_descending_by_default() {
        let r = report(&[3, 11, 7]).sorted(SortOrder::default());
        let order: Vec<u64> = r.results.iter().map(|e| e.number().get()).collect();
        assert_eq!(order, vec![11, 7, 3]);
        assert_eq!(r.untriaged, vec![IssueNumber::new(9), IssueNumber::new(2)]);
    }

    #[test]
    fn test_sorted_ascending() {
        let r = report(&[3, 11, 7]).sorted(SortOrder::Ascending);
        let order: Vec<u64> = r.results.iter().map(|e| e.number().get()).collect();
        assert_eq!(order, vec![3, 7, 11]);
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Ascending);
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Descending);
        assert!("random".parse::<SortOrder>().is_err());
    }

    #[test]
    fn test_entry_flattens_result_fields() {
        let mut e = entry(4);
        e.actions.push(SuggestedAction {
            label: "Close as fixed".to_string(),
            icon: "✅".to_string(),
            command: "gh issue close 4".to_string(),
            kind: ActionKind::Close,
        });
        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value["number"], 4);
        assert_eq!(value["reproStatus"], "missing");
        assert_eq!(value["actions"][0]["type"], "close");
    }
}
