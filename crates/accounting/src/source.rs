//! `AccountingSource` trait and query type.

use gpuquota_core::{JobRecord, SubjectKind, Timestamp};

use crate::error::Result;
use crate::parser::ParsedJobs;

/// Whose jobs a query selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    AllUsers,
    User(String),
    Account { account: String, qos: String },
}

impl Selector {
    pub fn matches(&self, job: &JobRecord) -> bool {
        match self {
            Selector::AllUsers => true,
            Selector::User(name) => job.user == *name,
            Selector::Account { account, qos } => job.account == *account && job.qos == *qos,
        }
    }
}

impl From<&SubjectKind> for Selector {
    fn from(kind: &SubjectKind) -> Self {
        match kind {
            SubjectKind::User { name } => Selector::User(name.clone()),
            SubjectKind::Account { account, qos } => Selector::Account {
                account: account.clone(),
                qos: qos.clone(),
            },
        }
    }
}

/// One accounting query: a selector, a partition filter and a time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingQuery {
    pub selector: Selector,
    /// Empty means all partitions.
    pub partitions: Vec<String>,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl AccountingQuery {
    pub fn new(selector: Selector, partitions: &[String], start: Timestamp, end: Timestamp) -> Self {
        Self {
            selector,
            partitions: partitions.to_vec(),
            start,
            end,
        }
    }

    /// Whether a job ran on one of the queried partitions. Pending jobs may
    /// list several candidate partitions separated by commas.
    pub fn partition_matches(&self, job: &JobRecord) -> bool {
        self.partitions.is_empty()
            || job
                .partition
                .split(',')
                .any(|p| self.partitions.iter().any(|q| q == p))
    }
}

/// Produces parsed job records for a query.
///
/// Implementations must surface transport and response-level failures as
/// errors rather than returning an empty record set.
#[async_trait::async_trait]
pub trait AccountingSource: Send + Sync {
    async fn fetch(&self, query: &AccountingQuery) -> Result<ParsedJobs>;

    /// Human-readable name for log lines (e.g., "sacct").
    fn source_name(&self) -> &str;
}
