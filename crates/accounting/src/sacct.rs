//! `sacct`-backed accounting source.

use std::process::Stdio;
use std::time::Duration;

use chrono::{Local, TimeZone};
use tokio::process::Command;
use tracing::{debug, info};

use gpuquota_core::Timestamp;

use crate::error::{AccountingError, Result};
use crate::parser::{parse_response, ParsedJobs};
use crate::source::{AccountingQuery, AccountingSource, Selector};

/// Queries Slurm accounting by running `sacct ... --json`.
///
/// One `sacct` call is made per queried partition and the responses are
/// merged, so a job visible in several partitions is counted once.
#[derive(Debug, Clone)]
pub struct SacctSource {
    program: String,
    timeout: Duration,
}

impl SacctSource {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Build the argument list for one partition (or none).
    pub fn build_args(query: &AccountingQuery, partition: Option<&str>) -> Vec<String> {
        let mut args = Vec::new();
        match &query.selector {
            Selector::AllUsers => args.push("--allusers".to_string()),
            Selector::User(name) => {
                args.push("-u".to_string());
                args.push(name.clone());
            }
            Selector::Account { account, qos } => {
                args.push("--allusers".to_string());
                args.push("-A".to_string());
                args.push(account.clone());
                args.push(format!("--qos={}", qos));
            }
        }
        args.push("-S".to_string());
        args.push(format_sacct_time(query.start));
        args.push("-E".to_string());
        args.push(format_sacct_time(query.end));
        if let Some(p) = partition {
            args.push(format!("--partition={}", p));
        }
        args.push("--json".to_string());
        args
    }

    async fn run(&self, args: Vec<String>) -> Result<ParsedJobs> {
        debug!(program = %self.program, ?args, "running accounting query");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AccountingError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AccountingError::Timeout {
                program: self.program.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| AccountingError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(AccountingError::CommandFailed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_response(&output.stdout)
    }
}

#[async_trait::async_trait]
impl AccountingSource for SacctSource {
    async fn fetch(&self, query: &AccountingQuery) -> Result<ParsedJobs> {
        let mut merged = ParsedJobs::default();

        if query.partitions.is_empty() {
            merged = self.run(Self::build_args(query, None)).await?;
        } else {
            for partition in &query.partitions {
                let parsed = self.run(Self::build_args(query, Some(partition))).await?;
                merged.merge(parsed);
            }
        }

        info!(
            source = "sacct",
            selector = ?query.selector,
            records = merged.records.len(),
            skipped = merged.errors.len(),
            "accounting query complete"
        );
        Ok(merged)
    }

    fn source_name(&self) -> &str {
        "sacct"
    }
}

/// sacct interprets `-S`/`-E` in the cluster's local time.
fn format_sacct_time(ts: Timestamp) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn query(selector: Selector, partitions: &[&str]) -> AccountingQuery {
        let partitions: Vec<String> = partitions.iter().map(|p| p.to_string()).collect();
        AccountingQuery::new(selector, &partitions, 1_700_000_000, 1_700_086_400)
    }

    /// Write an executable shell script standing in for `sacct`.
    fn fake_sacct(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("sacct");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[test]
    fn args_for_single_user() {
        let args = SacctSource::build_args(&query(Selector::User("alice".into()), &[]), Some("pli-c"));
        assert_eq!(&args[0..2], &["-u".to_string(), "alice".to_string()]);
        assert!(args.contains(&"--partition=pli-c".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--json"));
    }

    #[test]
    fn args_for_all_users_and_accounts() {
        let all = SacctSource::build_args(&query(Selector::AllUsers, &[]), None);
        assert_eq!(all[0], "--allusers");
        assert!(!all.iter().any(|a| a.starts_with("--partition")));

        let account = SacctSource::build_args(
            &query(
                Selector::Account {
                    account: "lab".into(),
                    qos: "high".into(),
                },
                &[],
            ),
            None,
        );
        assert!(account.contains(&"-A".to_string()));
        assert!(account.contains(&"lab".to_string()));
        assert!(account.contains(&"--qos=high".to_string()));
    }

    #[tokio::test]
    async fn fetch_merges_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_sacct(
            &dir,
            r#"echo '{"jobs": [{"job_id": 9, "user": "alice", "state": "RUNNING", "time": {"start": 1700000100, "elapsed": 3600}, "tres": {"allocated": [{"type": "gres", "name": "gpu", "count": 1}]}}]}'"#,
        );
        let source = SacctSource::new(program, Duration::from_secs(10));

        let parsed = source
            .fetch(&query(Selector::AllUsers, &["pli-c", "pli-lc"]))
            .await
            .unwrap();
        // Same job reported by both partitions is counted once.
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].gpu_count, 1);
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_sacct(&dir, "echo 'slurmdbd unreachable' >&2\nexit 1");
        let source = SacctSource::new(program, Duration::from_secs(10));

        let err = source
            .fetch(&query(Selector::AllUsers, &[]))
            .await
            .unwrap_err();
        match err {
            AccountingError::CommandFailed { stderr, .. } => {
                assert!(stderr.contains("slurmdbd unreachable"));
            }
            other => panic!("Expected CommandFailed, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let source = SacctSource::new("/nonexistent/sacct", Duration::from_secs(1));
        let err = source
            .fetch(&query(Selector::AllUsers, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountingError::Spawn { .. }));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_sacct(&dir, "sleep 5");
        let source = SacctSource::new(program, Duration::from_millis(100));

        let err = source
            .fetch(&query(Selector::AllUsers, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountingError::Timeout { .. }));
    }
}
