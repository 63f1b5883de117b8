//! Replay cached `sacct --json` dumps from a directory.
//!
//! Useful for dry runs against a snapshot and for reproducing a cycle
//! offline. Every `*.json` file in the directory is parsed on each fetch
//! and the query's selector, partitions and time range are applied in
//! memory.

use std::path::PathBuf;

use tracing::{debug, info};

use gpuquota_core::JobRecord;

use crate::error::Result;
use crate::parser::{parse_response, ParsedJobs};
use crate::source::{AccountingQuery, AccountingSource};

/// Accounting source backed by a directory of `sacct --json` dumps.
#[derive(Debug, Clone)]
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn dump_files(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e == "json")
                .unwrap_or(false);
            if is_json {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// sacct selects jobs that were pending or ran at any point in `[start, end]`.
fn overlaps(query: &AccountingQuery, job: &JobRecord) -> bool {
    match job.start_time {
        None => true,
        Some(started) => {
            let finished = started + job.elapsed_seconds as i64;
            started <= query.end && (finished >= query.start || job.is_active())
        }
    }
}

#[async_trait::async_trait]
impl AccountingSource for JsonDirSource {
    async fn fetch(&self, query: &AccountingQuery) -> Result<ParsedJobs> {
        let mut merged = ParsedJobs::default();

        for path in self.dump_files().await? {
            let raw = tokio::fs::read(&path).await?;
            let mut parsed = parse_response(&raw)?;
            parsed.records.retain(|job| {
                query.selector.matches(job) && query.partition_matches(job) && overlaps(query, job)
            });
            debug!(path = %path.display(), records = parsed.records.len(), "replayed dump");
            merged.merge(parsed);
        }

        info!(
            source = "json-dir",
            dir = %self.dir.display(),
            selector = ?query.selector,
            records = merged.records.len(),
            skipped = merged.errors.len(),
            "accounting query complete"
        );
        Ok(merged)
    }

    fn source_name(&self) -> &str {
        "json-dir"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccountingError;
    use crate::source::Selector;

    const DUMP: &str = r#"{"jobs": [
        {"job_id": 1, "user": "alice", "partition": "pli-c", "state": "COMPLETED",
         "time": {"start": 1000, "elapsed": 100}},
        {"job_id": 2, "user": "bob", "partition": "pli-c", "state": "RUNNING",
         "time": {"start": 5000, "elapsed": 100}},
        {"job_id": 3, "user": "alice", "partition": "pli-lc", "state": "PENDING",
         "time": {"start": 0, "elapsed": 0}},
        {"job_id": 4, "user": "alice", "partition": "pli-c", "state": "PENDING",
         "time": {"start": 0, "elapsed": 0}}
    ]}"#;

    fn source_with(files: &[(&str, &str)]) -> (tempfile::TempDir, JsonDirSource) {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in files {
            std::fs::write(dir.path().join(name), body).unwrap();
        }
        let source = JsonDirSource::new(dir.path());
        (dir, source)
    }

    fn ids(parsed: &ParsedJobs) -> Vec<&str> {
        parsed.records.iter().map(|r| r.job_id.as_str()).collect()
    }

    #[tokio::test]
    async fn filters_by_selector_partition_and_range() {
        let (_dir, source) = source_with(&[("sacct_pli_core.json", DUMP), ("notes.txt", "ignored")]);
        let query = AccountingQuery::new(
            Selector::User("alice".into()),
            &["pli-c".to_string()],
            900,
            2000,
        );
        let parsed = source.fetch(&query).await.unwrap();
        assert_eq!(ids(&parsed), vec!["4", "1"]);
    }

    #[tokio::test]
    async fn finished_jobs_before_range_are_excluded() {
        let (_dir, source) = source_with(&[("a.json", DUMP)]);
        let query = AccountingQuery::new(Selector::AllUsers, &[], 2000, 9000);
        let parsed = source.fetch(&query).await.unwrap();
        assert_eq!(ids(&parsed), vec!["3", "4", "2"]);
    }

    #[tokio::test]
    async fn corrupt_dump_fails_the_fetch() {
        let (_dir, source) = source_with(&[("a.json", DUMP), ("b.json", "{not json")]);
        let query = AccountingQuery::new(Selector::AllUsers, &[], 0, 9000);
        let err = source.fetch(&query).await.unwrap_err();
        assert!(matches!(err, AccountingError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn missing_directory_is_io_error() {
        let source = JsonDirSource::new("/nonexistent/sacct-cache");
        let query = AccountingQuery::new(Selector::AllUsers, &[], 0, 1);
        let err = source.fetch(&query).await.unwrap_err();
        assert!(matches!(err, AccountingError::Io(_)));
    }
}
