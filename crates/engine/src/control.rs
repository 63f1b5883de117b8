//! Scheduler control: the only way the engine acts on jobs.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

/// Errors from cancelling a job.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} {job_id} exited with {status}: {stderr}")]
    Rejected {
        program: String,
        job_id: String,
        status: String,
        stderr: String,
    },

    #[error("{program} {job_id} timed out after {secs}s")]
    Timeout {
        program: String,
        job_id: String,
        secs: u64,
    },
}

/// Cancels jobs on the scheduler.
#[async_trait::async_trait]
pub trait SchedulerControl: Send + Sync {
    async fn cancel(&self, job_id: &str) -> Result<(), ControlError>;

    fn control_name(&self) -> &str;
}

/// Cancels jobs by running `scancel <job_id>`.
#[derive(Debug, Clone)]
pub struct ScancelControl {
    program: String,
    timeout: Duration,
}

impl ScancelControl {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl SchedulerControl for ScancelControl {
    async fn cancel(&self, job_id: &str) -> Result<(), ControlError> {
        let child = Command::new(&self.program)
            .arg(job_id)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ControlError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ControlError::Timeout {
                program: self.program.clone(),
                job_id: job_id.to_string(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| ControlError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ControlError::Rejected {
                program: self.program.clone(),
                job_id: job_id.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(job_id, "job cancelled");
        Ok(())
    }

    fn control_name(&self) -> &str {
        "scancel"
    }
}

/// Logs the cancellation it would have issued.
#[derive(Debug, Clone, Default)]
pub struct DryRunControl;

#[async_trait::async_trait]
impl SchedulerControl for DryRunControl {
    async fn cancel(&self, job_id: &str) -> Result<(), ControlError> {
        warn!(job_id, "dry run: job would be cancelled");
        Ok(())
    }

    fn control_name(&self) -> &str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn fake_scancel(dir: &tempfile::TempDir, body: &str) -> String {
        let path = dir.path().join("scancel");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn scancel_receives_job_id() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("cancelled.txt");
        let program = fake_scancel(&dir, &format!("echo \"$1\" >> {}", log.display()));
        let control = ScancelControl::new(program, Duration::from_secs(10));

        control.cancel("4242").await.unwrap();
        control.cancel("4243").await.unwrap();

        let cancelled = std::fs::read_to_string(&log).unwrap();
        assert_eq!(cancelled, "4242\n4243\n");
    }

    #[tokio::test]
    async fn rejected_cancel_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let program = fake_scancel(&dir, "echo 'Invalid job id specified' >&2\nexit 1");
        let control = ScancelControl::new(program, Duration::from_secs(10));

        match control.cancel("1").await.unwrap_err() {
            ControlError::Rejected { job_id, stderr, .. } => {
                assert_eq!(job_id, "1");
                assert!(stderr.contains("Invalid job id"));
            }
            other => panic!("Expected Rejected, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let control = ScancelControl::new("/nonexistent/scancel", Duration::from_secs(1));
        let err = control.cancel("1").await.unwrap_err();
        assert!(matches!(err, ControlError::Spawn { .. }));
    }

    #[tokio::test]
    async fn dry_run_never_fails() {
        let control = DryRunControl;
        assert!(control.cancel("77").await.is_ok());
        assert_eq!(control.control_name(), "dry-run");
    }
}
