//! Window policy: turn a [`WindowSpec`] and "now" into `[start, end]`.

use chrono::{DateTime, Datelike, TimeZone};
use serde::{Deserialize, Serialize};

use gpuquota_core::{Timestamp, WindowSpec};

use crate::error::{QuotaError, Result};

/// A resolved usage window. `end` is always the evaluation instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub spec: WindowSpec,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Window {
    /// Window length in whole hours.
    pub fn length_hours(&self) -> i64 {
        (self.end - self.start) / 3600
    }

    pub fn supports_forecast(&self) -> bool {
        !matches!(self.spec, WindowSpec::Calendar)
    }
}

/// Resolve a window policy at `now`.
///
/// Calendar windows start at midnight on the first of the month in `now`'s
/// own timezone, so callers pass `Local::now()` to match the cluster's
/// notion of a month.
pub fn resolve<Tz: TimeZone>(spec: &WindowSpec, now: &DateTime<Tz>) -> Result<Window> {
    let end = now.timestamp();

    let start = match *spec {
        WindowSpec::Rolling { minutes } => {
            if minutes <= 0 {
                return Err(QuotaError::InvalidWindow(format!(
                    "rolling window must be positive, got {} minutes",
                    minutes
                )));
            }
            let lookback = minutes.checked_mul(60).ok_or_else(|| {
                QuotaError::InvalidWindow(format!("rolling window of {} minutes overflows", minutes))
            })?;
            end.saturating_sub(lookback)
        }
        WindowSpec::Calendar => month_start(now)?,
        WindowSpec::Anchored { start } => {
            if start > end {
                return Err(QuotaError::InvalidWindow(format!(
                    "anchored start {} is after now ({})",
                    start, end
                )));
            }
            start
        }
    };

    Ok(Window {
        spec: *spec,
        start,
        end,
    })
}

fn month_start<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<Timestamp> {
    let first = now
        .date_naive()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| QuotaError::InvalidWindow("cannot compute month start".to_string()))?;

    now.timezone()
        .from_local_datetime(&first)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| {
            QuotaError::InvalidWindow("month start does not exist in this timezone".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn at(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    #[test]
    fn rolling_window_looks_back_from_now() {
        let now = at("2026-10-18T12:00:00Z");
        let window = resolve(&WindowSpec::Rolling { minutes: 90 }, &now).unwrap();
        assert_eq!(window.end, now.timestamp());
        assert_eq!(window.start, now.timestamp() - 5400);
        assert!(window.supports_forecast());
    }

    #[test]
    fn non_positive_rolling_window_is_invalid() {
        let now = Utc::now();
        for minutes in [0, -5] {
            let err = resolve(&WindowSpec::Rolling { minutes }, &now).unwrap_err();
            assert!(matches!(err, QuotaError::InvalidWindow(_)));
        }
    }

    #[test]
    fn calendar_window_starts_at_first_of_month() {
        let now = at("2026-10-18T12:34:56Z");
        let window = resolve(&WindowSpec::Calendar, &now).unwrap();
        assert_eq!(window.start, at("2026-10-01T00:00:00Z").timestamp());
        assert!(!window.supports_forecast());
    }

    #[test]
    fn calendar_window_uses_now_timezone() {
        // 02:00 on Nov 1st at +05:00 is still October in UTC.
        let now = at("2026-11-01T02:00:00+05:00");
        let window = resolve(&WindowSpec::Calendar, &now).unwrap();
        assert_eq!(window.start, at("2026-11-01T00:00:00+05:00").timestamp());
    }

    #[test]
    fn anchored_window_uses_fixed_start() {
        let now = at("2026-10-18T00:00:00Z");
        let start = at("2026-09-01T00:00:00Z").timestamp();
        let window = resolve(&WindowSpec::Anchored { start }, &now).unwrap();
        assert_eq!(window.start, start);
        assert_eq!(window.length_hours(), 47 * 24);
    }

    #[test]
    fn anchored_start_in_future_is_invalid() {
        let now = at("2026-10-18T00:00:00Z");
        let start = at("2026-10-19T00:00:00Z").timestamp();
        let err = resolve(&WindowSpec::Anchored { start }, &now).unwrap_err();
        assert!(err.to_string().contains("after now"), "got: {err}");
    }

    #[test]
    fn anchored_start_equal_to_now_is_empty_window() {
        let now = at("2026-10-18T00:00:00Z");
        let window = resolve(&WindowSpec::Anchored { start: now.timestamp() }, &now).unwrap();
        assert_eq!(window.start, window.end);
    }
}
