//! Parse `sacct --json` responses into [`JobRecord`]s.
//!
//! Each job entry is deserialized on its own, so one malformed entry is
//! reported and skipped without affecting its siblings. Both the older
//! flat Slurm layout (`"state": "RUNNING"`, `"limit": 60`) and the newer
//! structured one (`"state": {"current": [..]}`, `"limit": {"set": .., "number": ..}`)
//! are accepted.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use gpuquota_core::{JobRecord, JobState};

use crate::error::{AccountingError, Result};

#[derive(Debug, Deserialize)]
struct RawResponse {
    jobs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    job_id: RawId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    account: String,
    #[serde(default)]
    qos: String,
    #[serde(default)]
    partition: String,
    state: RawState,
    time: RawTime,
    #[serde(default)]
    tres: RawTres,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawState {
    Plain(String),
    Nested { current: Vec<String> },
}

#[derive(Debug, Deserialize)]
struct RawTime {
    #[serde(default)]
    start: Option<RawNumber>,
    #[serde(default)]
    submission: Option<RawNumber>,
    #[serde(default)]
    elapsed: Option<RawNumber>,
    #[serde(default)]
    limit: Option<RawNumber>,
}

/// Slurm encodes optional numbers either bare or as `{set, infinite, number}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Plain(i64),
    Structured {
        #[serde(default = "default_true")]
        set: bool,
        #[serde(default)]
        infinite: bool,
        #[serde(default)]
        number: i64,
    },
}

fn default_true() -> bool {
    true
}

impl RawNumber {
    fn value(&self) -> Option<i64> {
        match self {
            RawNumber::Plain(n) => Some(*n),
            RawNumber::Structured {
                set,
                infinite,
                number,
            } => (*set && !*infinite).then_some(*number),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawTres {
    #[serde(default)]
    allocated: Vec<RawTresEntry>,
}

#[derive(Debug, Deserialize)]
struct RawTresEntry {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    count: i64,
}

/// Outcome of parsing one accounting response.
#[derive(Debug, Default)]
pub struct ParsedJobs {
    /// Valid records, ascending by start time (unstarted jobs first).
    pub records: Vec<JobRecord>,
    /// Entries that were skipped, as [`AccountingError::MalformedRecord`].
    pub errors: Vec<AccountingError>,
}

impl ParsedJobs {
    /// Merge another response, keeping the first copy of each job ID.
    pub fn merge(&mut self, other: ParsedJobs) {
        let mut seen: HashSet<String> = self.records.iter().map(|r| r.job_id.clone()).collect();
        self.records.reserve(other.records.len());
        for record in other.records {
            if seen.insert(record.job_id.clone()) {
                self.records.push(record);
            }
        }
        self.errors.extend(other.errors);
        sort_by_start(&mut self.records);
    }
}

pub(crate) fn sort_by_start(records: &mut [JobRecord]) {
    records.sort_by_key(|r| r.start_time.unwrap_or(0));
}

/// Parse a full `sacct --json` response.
///
/// Fails only if the payload is not JSON or has no `jobs` array; individual
/// bad entries land in [`ParsedJobs::errors`].
pub fn parse_response(raw: &[u8]) -> Result<ParsedJobs> {
    let response: RawResponse = serde_json::from_slice(raw)
        .map_err(|e| AccountingError::MalformedResponse(e.to_string()))?;

    let mut parsed = ParsedJobs {
        records: Vec::with_capacity(response.jobs.len()),
        errors: Vec::new(),
    };

    for entry in response.jobs {
        match parse_job(entry) {
            Ok(record) => parsed.records.push(record),
            Err(e) => {
                warn!(error = %e, "skipping malformed job record");
                parsed.errors.push(e);
            }
        }
    }

    sort_by_start(&mut parsed.records);
    Ok(parsed)
}

/// Parse a single job entry.
pub fn parse_job(entry: Value) -> Result<JobRecord> {
    let job_id_hint = entry
        .get("job_id")
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| "<unknown>".to_string());

    let malformed = |reason: String| AccountingError::MalformedRecord {
        job_id: job_id_hint.clone(),
        reason,
    };

    let raw: RawJob = serde_json::from_value(entry).map_err(|e| malformed(e.to_string()))?;

    let state = match &raw.state {
        RawState::Plain(s) => JobState::parse(s),
        RawState::Nested { current } => match current.first() {
            Some(s) => JobState::parse(s),
            None => return Err(malformed("empty state list".to_string())),
        },
    };

    let job_id = match raw.job_id {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    };

    let start_time = raw
        .time
        .start
        .as_ref()
        .and_then(RawNumber::value)
        .filter(|t| *t > 0);
    let submission_time = raw
        .time
        .submission
        .as_ref()
        .and_then(RawNumber::value)
        .unwrap_or(0);
    let elapsed_seconds = raw
        .time
        .elapsed
        .as_ref()
        .and_then(RawNumber::value)
        .unwrap_or(0)
        .max(0) as u64;
    let wall_time_limit = raw
        .time
        .limit
        .as_ref()
        .and_then(RawNumber::value)
        .filter(|m| *m >= 0)
        .map(|m| m as u64);

    Ok(JobRecord {
        job_id,
        job_name: raw.name,
        user: raw.user,
        account: raw.account,
        qos: raw.qos,
        partition: raw.partition,
        state,
        gpu_count: gpu_count(&raw.tres),
        elapsed_seconds,
        start_time,
        submission_time,
        wall_time_limit,
    })
}

/// Sum of all `gres/gpu` allocations.
fn gpu_count(tres: &RawTres) -> u32 {
    let total: i64 = tres
        .allocated
        .iter()
        .filter(|a| a.kind == "gres" && a.name.as_deref() == Some("gpu"))
        .map(|a| a.count.max(0))
        .sum();
    total.min(u32::MAX as i64) as u32
}
