//! Aggregation of cached results into one report.
//!
//! The report is rebuilt from scratch on every call. Nothing is counted
//! incrementally, so the summary always agrees with the entry list.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use tracing::{debug, info};
use triage_core::{
    AggregateReport, BacklogItem, Category, ReportEntry, ReportSummary, ReproStatus, TaskResult,
    Timing, TokenUsage, VerificationStatus,
};

use crate::actions::suggest_actions;
use crate::config::TriageConfig;
use crate::error::PipelineError;
use crate::playground::playground_link;

/// Build the report.
///
/// With a `scope`, only those items are considered and the ones without a
/// cache entry are listed as untriaged. Without one, every entry in the
/// results directory is reported. Entries keep scope (or ascending) order;
/// sorting happens when the report is written.
pub fn aggregate(
    config: &TriageConfig,
    scope: Option<&[BacklogItem]>,
    compiler_version: Option<String>,
) -> Result<AggregateReport, PipelineError> {
    let cache = config.cache();
    let mut results = Vec::new();
    let mut untriaged = Vec::new();

    match scope {
        Some(items) => {
            let mut seen = HashSet::new();
            for item in items.iter().filter(|item| seen.insert(item.number)) {
                match cache.get(item.number) {
                    Some(result) => results.push(refresh(result, item)),
                    None => untriaged.push(item.number),
                }
            }
        }
        None => results = cache.entries()?,
    }

    let entries: Vec<ReportEntry> = results
        .into_iter()
        .map(|mut result| {
            if result.playground_link.as_deref().map_or(true, str::is_empty) {
                if let Some(code) = result.repro_code() {
                    let link = playground_link(
                        &config.playground_url,
                        code,
                        &result.emitter,
                        result.compiler_options.as_ref(),
                    );
                    debug!(issue = %result.number, "Derived playground link");
                    result.playground_link = Some(link);
                }
            }
            let actions = suggest_actions(&result, config);
            ReportEntry { result, actions }
        })
        .collect();

    let results: Vec<&TaskResult> = entries.iter().map(|e| &e.result).collect();
    let report = AggregateReport {
        generated_at: Utc::now(),
        compiler_version,
        model: detect_model(&results).unwrap_or_else(|| config.model.clone()),
        timing: timing(&results),
        token_usage: token_usage(&results),
        summary: summarize(&results),
        untriaged,
        results: entries,
    };

    info!(
        results = report.results.len(),
        untriaged = report.untriaged.len(),
        model = %report.model,
        "Aggregated triage results"
    );
    Ok(report)
}

/// Take identity fields the agent left blank, and the current labels, from
/// the tracker item.
fn refresh(mut result: TaskResult, item: &BacklogItem) -> TaskResult {
    if result.url.is_empty() {
        result.url = item.url.clone();
    }
    if result.author.is_empty() {
        result.author = item.author.clone();
    }
    if result.created_at.is_none() {
        result.created_at = Some(item.created_at);
    }
    result.labels = item.labels.clone();
    result
}

/// Counts per category, reproduction status and verification status.
///
/// Every known bucket is present, with zero when nothing falls in it.
pub fn summarize(results: &[&TaskResult]) -> ReportSummary {
    let mut by_category: BTreeMap<String, usize> = Category::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), 0))
        .collect();
    let mut by_repro_status: BTreeMap<String, usize> = ReproStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let mut by_verification: BTreeMap<String, usize> = VerificationStatus::ALL
        .iter()
        .map(|s| s.as_str())
        .chain([VerificationStatus::NOT_VERIFIED])
        .map(|s| (s.to_string(), 0))
        .collect();

    for result in results {
        *by_category
            .entry(result.category.as_str().to_string())
            .or_default() += 1;
        *by_repro_status
            .entry(result.repro_status.as_str().to_string())
            .or_default() += 1;
        let verification = result
            .verification
            .map_or(VerificationStatus::NOT_VERIFIED, |v| v.as_str());
        *by_verification.entry(verification.to_string()).or_default() += 1;
    }

    ReportSummary {
        total_issues: results.len(),
        by_category,
        by_repro_status,
        by_verification,
    }
}

/// Duration statistics over results with a positive duration.
pub fn timing(results: &[&TaskResult]) -> Timing {
    let durations: Vec<f64> = results
        .iter()
        .filter_map(|r| r.triage_duration_seconds)
        .filter(|d| d.is_finite() && *d > 0.0)
        .collect();

    if durations.is_empty() {
        return Timing::default();
    }

    let total: f64 = durations.iter().sum();
    Timing {
        timed_items: durations.len(),
        total_seconds: total,
        average_seconds: Some(total / durations.len() as f64),
        min_seconds: durations.iter().copied().reduce(f64::min),
        max_seconds: durations.iter().copied().reduce(f64::max),
    }
}

/// Summed token counters.
pub fn token_usage(results: &[&TaskResult]) -> TokenUsage {
    results
        .iter()
        .filter_map(|r| r.token_usage)
        .fold(TokenUsage::default(), TokenUsage::saturating_add)
}

/// Most frequent model, ties going to the one seen first.
pub fn detect_model(results: &[&TaskResult]) -> Option<String> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for model in results
        .iter()
        .filter_map(|r| r.model.as_deref())
        .map(str::trim)
        .filter(|m| !m.is_empty())
    {
        match counts.iter_mut().find(|(seen, _)| *seen == model) {
            Some((_, count)) => *count += 1,
            None => counts.push((model, 1)),
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for (model, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((model, count));
        }
    }
    best.map(|(model, _)| model.to_string())
}
