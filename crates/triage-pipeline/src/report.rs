//! Report writing.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;
use triage_core::{AggregateReport, SortOrder};

use crate::error::PipelineError;

/// Sort and write a report, replacing any previous one atomically.
///
/// An empty report is not written: `Ok(None)` means there were no results
/// yet, which is not an error.
pub fn write_report(
    report: AggregateReport,
    path: &Path,
    order: SortOrder,
) -> Result<Option<PathBuf>, PipelineError> {
    if report.is_empty() {
        info!(untriaged = report.untriaged.len(), "No results yet, report not written");
        return Ok(None);
    }

    let report = report.sorted(order);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    serde_json::to_writer_pretty(&mut tmp, &report)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;

    info!(
        path = %path.display(),
        results = report.results.len(),
        untriaged = report.untriaged.len(),
        "Report written"
    );
    Ok(Some(path.to_path_buf()))
}
