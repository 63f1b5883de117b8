//! Template context for quota notices.

use serde::Serialize;

/// Which notice is being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Over quota, still inside the grace period.
    Warning,
    /// Over quota past the grace period; active jobs are being cancelled.
    Cancellation,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Warning => "warning",
            NoticeKind::Cancellation => "cancellation",
        }
    }
}

/// One running or pending job listed in a notice.
#[derive(Debug, Clone, Serialize)]
pub struct NoticeJob {
    pub job_id: String,
    pub job_name: String,
    pub user: String,
    pub state: String,
    pub partition: String,
    pub gpu_count: u32,
    /// Local start time, or `"pending"`.
    pub start_time: String,
}

/// Everything a notice template can reference.
#[derive(Debug, Clone, Serialize)]
pub struct NoticeContext {
    pub kind: NoticeKind,
    /// Short key, e.g. `alice` or `lab/high`.
    pub subject_key: String,
    /// Display label, e.g. `user alice`.
    pub subject_label: String,
    pub recipients: Vec<String>,
    pub partitions: String,
    pub grace_hours: i64,
    /// Pre-rendered usage report.
    pub report: String,
    pub jobs: Vec<NoticeJob>,
    pub timestamp: String,
}
