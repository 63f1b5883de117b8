use serde::{Deserialize, Serialize};

/// Epoch seconds, as reported by the scheduler's accounting database.
pub type Timestamp = i64;

/// Scheduler job state, normalized from the accounting source's spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Running,
    Pending,
    Completed,
    Cancelled,
    Failed,
    Timeout,
    NodeFail,
    Preempted,
    OutOfMemory,
    Suspended,
    Requeued,
    Other(String),
}

impl JobState {
    /// Running and pending jobs are the ones enforcement can still act on.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Running | JobState::Pending)
    }

    /// Parse a scheduler state token. Unknown tokens are kept verbatim.
    ///
    /// Slurm appends detail to some states (`CANCELLED by 1234`), so only the
    /// first word is matched.
    pub fn parse(raw: &str) -> Self {
        let token = raw.split_whitespace().next().unwrap_or("").to_ascii_uppercase();
        match token.as_str() {
            "RUNNING" => JobState::Running,
            "PENDING" => JobState::Pending,
            "COMPLETED" => JobState::Completed,
            "CANCELLED" => JobState::Cancelled,
            "FAILED" => JobState::Failed,
            "TIMEOUT" => JobState::Timeout,
            "NODE_FAIL" => JobState::NodeFail,
            "PREEMPTED" => JobState::Preempted,
            "OUT_OF_MEMORY" => JobState::OutOfMemory,
            "SUSPENDED" => JobState::Suspended,
            "REQUEUED" => JobState::Requeued,
            _ => JobState::Other(token),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Running => write!(f, "RUNNING"),
            JobState::Pending => write!(f, "PENDING"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Cancelled => write!(f, "CANCELLED"),
            JobState::Failed => write!(f, "FAILED"),
            JobState::Timeout => write!(f, "TIMEOUT"),
            JobState::NodeFail => write!(f, "NODE_FAIL"),
            JobState::Preempted => write!(f, "PREEMPTED"),
            JobState::OutOfMemory => write!(f, "OUT_OF_MEMORY"),
            JobState::Suspended => write!(f, "SUSPENDED"),
            JobState::Requeued => write!(f, "REQUEUED"),
            JobState::Other(s) => write!(f, "{}", s),
        }
    }
}

/// One scheduler job, normalized from a raw accounting entry.
///
/// Records are attributed to the moment they began running: usage windows
/// match on `start_time`, never on submission or completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub job_name: String,
    pub user: String,
    pub account: String,
    pub qos: String,
    pub partition: String,
    pub state: JobState,
    pub gpu_count: u32,
    pub elapsed_seconds: u64,
    /// `None` for jobs that have not started yet.
    pub start_time: Option<Timestamp>,
    pub submission_time: Timestamp,
    /// Wall time limit in minutes; `None` when unlimited.
    pub wall_time_limit: Option<u64>,
}

impl JobRecord {
    pub fn gpu_hours(&self) -> f64 {
        self.elapsed_seconds as f64 * self.gpu_count as f64 / 3600.0
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
