//! Task cache: one persisted result per backlog item.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use triage_core::{IssueNumber, TaskResult};

use crate::error::PipelineError;

/// Result store keyed by issue number, backed by `{number}.json` files.
///
/// Readers never see a half-written entry: writes go to a temp file in the
/// same directory and are renamed into place.
#[derive(Debug, Clone)]
pub struct TaskCache {
    dir: PathBuf,
}

impl TaskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry for an item.
    pub fn path(&self, number: IssueNumber) -> PathBuf {
        self.dir.join(format!("{number}.json"))
    }

    /// Load an entry.
    ///
    /// Returns `None` when the file is missing, unreadable, does not parse,
    /// or belongs to a different item. Anything but a missing file is
    /// logged as a warning.
    pub fn get(&self, number: IssueNumber) -> Option<TaskResult> {
        let path = self.path(number);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(issue = %number, path = %path.display(), error = %e, "Unreadable cache entry, treating as absent");
                return None;
            }
        };

        match serde_json::from_str::<TaskResult>(&raw) {
            Ok(result) if result.number == number => Some(result),
            Ok(result) => {
                warn!(
                    issue = %number,
                    found = %result.number,
                    path = %path.display(),
                    "Cache entry belongs to another issue, treating as absent"
                );
                None
            }
            Err(e) => {
                warn!(issue = %number, path = %path.display(), error = %e, "Corrupt cache entry, treating as absent");
                None
            }
        }
    }

    /// Write an entry atomically, replacing any previous one.
    pub fn put(&self, result: &TaskResult) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(result.number);

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, result)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)?;

        debug!(issue = %result.number, path = %path.display(), "Cache entry written");
        Ok(())
    }

    /// Every parseable entry in the directory, in ascending number order.
    ///
    /// Files that are not named `{number}.json` are ignored.
    pub fn entries(&self) -> Result<Vec<TaskResult>, PipelineError> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut numbers: Vec<IssueNumber> = read_dir
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let stem = name.to_str()?.strip_suffix(".json")?;
                stem.parse::<u64>().ok().map(IssueNumber::new)
            })
            .collect();
        numbers.sort();

        Ok(numbers.into_iter().filter_map(|n| self.get(n)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use triage_core::{Category, ReproStatus};

    fn result(number: u64) -> TaskResult {
        TaskResult::new(number, "Decorator crash", Category::Bug, ReproStatus::HasRepro)
    }

    #[test]
    fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let cache = TaskCache::new(dir.path().join("results"));

        cache.put(&result(7)).unwrap();

        assert_eq!(cache.get(IssueNumber::new(7)), Some(result(7)));
        assert!(cache.get(IssueNumber::new(8)).is_none());
    }

    #[test]
    fn test_corrupt_entry_is_absent() {
        let dir = TempDir::new().unwrap();
        let cache = TaskCache::new(dir.path());
        fs::write(cache.path(IssueNumber::new(3)), "{ not json").unwrap();

        assert!(cache.get(IssueNumber::new(3)).is_none());
    }

    #[test]
    fn test_entry_for_other_issue_is_absent() {
        let dir = TempDir::new().unwrap();
        let cache = TaskCache::new(dir.path());
        let json = serde_json::to_string(&result(99)).unwrap();
        fs::write(cache.path(IssueNumber::new(3)), json).unwrap();

        assert!(cache.get(IssueNumber::new(3)).is_none());
    }

    #[test]
    fn test_put_replaces_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let cache = TaskCache::new(dir.path());

        cache.put(&result(5)).unwrap();
        let mut updated = result(5);
        updated.model = Some("gpt-5".to_string());
        cache.put(&updated).unwrap();

        assert_eq!(cache.get(IssueNumber::new(5)), Some(updated));
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_entries_skips_noise() {
        let dir = TempDir::new().unwrap();
        let cache = TaskCache::new(dir.path());
        cache.put(&result(20)).unwrap();
        cache.put(&result(3)).unwrap();
        fs::write(dir.path().join("notes.json"), "{}").unwrap();
        fs::write(dir.path().join("4.json"), "garbage").unwrap();

        let numbers: Vec<u64> = cache
            .entries()
            .unwrap()
            .iter()
            .map(|r| r.number.get())
            .collect();
        assert_eq!(numbers, vec![3, 20]);
    }

    #[test]
    fn test_entries_of_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = TaskCache::new(dir.path().join("nope"));
        assert!(cache.entries().unwrap().is_empty());
    }
}
