use serde::{Deserialize, Serialize};

use crate::job::{JobRecord, Timestamp};

/// Default grace period between first going over quota and cancellation.
pub const DEFAULT_GRACE_HOURS: i64 = 24;

/// How a subject's usage window is derived from "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowSpec {
    /// Fixed lookback that slides with "now".
    Rolling { minutes: i64 },
    /// From the first instant of the current month.
    Calendar,
    /// From a fixed epoch, e.g. an account's allocation start date.
    Anchored { start: Timestamp },
}

impl WindowSpec {
    pub fn rolling_days(days: i64) -> Self {
        WindowSpec::Rolling {
            minutes: days * 24 * 60,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WindowSpec::Rolling { .. } => "rolling",
            WindowSpec::Calendar => "calendar",
            WindowSpec::Anchored { .. } => "anchored",
        }
    }
}

/// What a quota is metered against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubjectKind {
    User { name: String },
    Account { account: String, qos: String },
}

impl SubjectKind {
    /// Whether a job is billed to this subject.
    pub fn matches(&self, job: &JobRecord) -> bool {
        match self {
            SubjectKind::User { name } => job.user == *name,
            SubjectKind::Account { account, qos } => job.account == *account && job.qos == *qos,
        }
    }
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubjectKind::User { name } => write!(f, "user {}", name),
            SubjectKind::Account { account, qos } => write!(f, "account {} (qos {})", account, qos),
        }
    }
}

/// A subject together with its quota policy for one monitoring cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaSubject {
    pub kind: SubjectKind,
    /// Quota in GPU-hours.
    pub quota: f64,
    pub window: WindowSpec,
    /// Length of the day-over-day grace check.
    pub grace_hours: i64,
}

impl QuotaSubject {
    pub fn user(name: impl Into<String>, quota: f64, window: WindowSpec) -> Self {
        Self {
            kind: SubjectKind::User { name: name.into() },
            quota,
            window,
            grace_hours: DEFAULT_GRACE_HOURS,
        }
    }

    pub fn account(
        account: impl Into<String>,
        qos: impl Into<String>,
        quota: f64,
        window: WindowSpec,
    ) -> Self {
        Self {
            kind: SubjectKind::Account {
                account: account.into(),
                qos: qos.into(),
            },
            quota,
            window,
            grace_hours: DEFAULT_GRACE_HOURS,
        }
    }

    pub fn with_grace_hours(mut self, hours: i64) -> Self {
        self.grace_hours = hours;
        self
    }

    /// Short identifier used in log lines and notices (`alice`, `lab/high`).
    pub fn name(&self) -> String {
        match &self.kind {
            SubjectKind::User { name } => name.clone(),
            SubjectKind::Account { account, qos } => format!("{}/{}", account, qos),
        }
    }
}

impl std::fmt::Display for QuotaSubject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}
