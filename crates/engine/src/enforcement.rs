//! Enforcement evaluator.
//!
//! A subject's state is derived from two usage sums over the same window
//! start: one through now, one through now minus the grace period. Going
//! over quota within the grace period only warns; staying over quota for
//! longer than that cancels. No state is carried between cycles.

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

use gpuquota_core::{JobRecord, QuotaSubject};

use crate::error::{QuotaError, Result};
use crate::usage::gpu_hours;
use crate::window::{resolve, Window};

/// Derived enforcement state. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnforcementState {
    Ok,
    Warn,
    Cancel,
}

impl EnforcementState {
    /// Apply the state rule to the two remaining-quota snapshots.
    pub fn classify(remaining_now: f64, remaining_yesterday: f64) -> Self {
        if remaining_now >= 0.0 {
            EnforcementState::Ok
        } else if remaining_yesterday >= 0.0 {
            EnforcementState::Warn
        } else {
            EnforcementState::Cancel
        }
    }
}

impl std::fmt::Display for EnforcementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnforcementState::Ok => write!(f, "OK"),
            EnforcementState::Warn => write!(f, "WARN"),
            EnforcementState::Cancel => write!(f, "CANCEL"),
        }
    }
}

/// Result of evaluating one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub window: Window,
    pub quota: f64,
    /// GPU-hours used through now.
    pub used: f64,
    pub remaining_now: f64,
    /// Remaining quota as it stood one grace period ago.
    pub remaining_yesterday: f64,
    pub state: EnforcementState,
}

/// Reject quotas and grace periods that would misclassify idle subjects.
fn check_limits(subject: &QuotaSubject) -> Result<()> {
    if !subject.quota.is_finite() || subject.quota <= 0.0 {
        return Err(QuotaError::InvalidQuota(format!(
            "{} has non-positive quota {}",
            subject, subject.quota
        )));
    }
    if subject.grace_hours < 0 {
        return Err(QuotaError::InvalidQuota(format!(
            "{} has negative grace period {}h",
            subject, subject.grace_hours
        )));
    }
    Ok(())
}

/// Evaluate a subject against records already fetched for `window`.
///
/// The grace check keeps the original window start. If the accounting
/// source retains less than window length plus the grace period, the
/// earlier snapshot silently undercounts.
pub fn evaluate_in(
    subject: &QuotaSubject,
    window: &Window,
    records: &[JobRecord],
) -> Result<Evaluation> {
    check_limits(subject)?;
    let used = gpu_hours(records, window.start, window.end);
    let grace_cutoff = window
        .end
        .saturating_sub(subject.grace_hours.saturating_mul(3600));
    let used_yesterday = gpu_hours(records, window.start, grace_cutoff);

    let remaining_now = subject.quota - used;
    let remaining_yesterday = subject.quota - used_yesterday;

    Ok(Evaluation {
        window: *window,
        quota: subject.quota,
        used,
        remaining_now,
        remaining_yesterday,
        state: EnforcementState::classify(remaining_now, remaining_yesterday),
    })
}

/// Resolve the subject's window at `now` and evaluate it.
pub fn evaluate<Tz: TimeZone>(
    subject: &QuotaSubject,
    records: &[JobRecord],
    now: &DateTime<Tz>,
) -> Result<Evaluation> {
    let window = resolve(&subject.window, now)?;
    evaluate_in(subject, &window, records)
}
