//! Usage aggregation over job records.

use std::collections::BTreeSet;

use gpuquota_core::{JobRecord, Timestamp};

/// GPU-hours of all jobs whose start time lies in `[start, end]`.
///
/// Both bounds are inclusive to match sacct's closed accounting interval.
/// Jobs that never started contribute nothing.
pub fn gpu_hours(records: &[JobRecord], start: Timestamp, end: Timestamp) -> f64 {
    records
        .iter()
        .filter(|job| matches!(job.start_time, Some(t) if t >= start && t <= end))
        .map(JobRecord::gpu_hours)
        .fold(0.0, |acc, hours| acc + hours)
}

/// Users with at least one running or pending job.
///
/// Deliberately ignores start times: a job can be active now even if it
/// started long before the discovery window, or has not started at all.
pub fn active_subjects(records: &[JobRecord]) -> BTreeSet<String> {
    records
        .iter()
        .filter(|job| job.is_active())
        .map(|job| job.user.clone())
        .collect()
}

/// Running and pending jobs, in record order.
pub fn active_jobs(records: &[JobRecord]) -> Vec<&JobRecord> {
    records.iter().filter(|job| job.is_active()).collect()
}
