//! Forecast how much quota frees up as a window's start slides forward.
//!
//! Only already-recorded jobs are considered; future submissions are not
//! modelled.

use serde::{Deserialize, Serialize};

use gpuquota_core::JobRecord;

use crate::error::{QuotaError, Result};
use crate::usage::gpu_hours;
use crate::window::Window;

/// Offsets, in hours, reported when the caller does not pick its own.
pub const DEFAULT_FORECAST_OFFSETS: [i64; 4] = [12, 24, 72, 168];

/// Remaining quota if the window start moved forward by `offset_hours`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub offset_hours: i64,
    /// Usage still inside the shifted window.
    pub usage: f64,
    pub remaining: f64,
}

/// Project remaining quota for each offset.
///
/// Fails with [`QuotaError::ForecastUnsupported`] for calendar windows.
/// Offsets that move the start past the window end leave no usage, so
/// their remaining quota equals `quota`.
pub fn forecast(
    window: &Window,
    quota: f64,
    records: &[JobRecord],
    offsets_hours: &[i64],
) -> Result<Vec<ForecastPoint>> {
    if !window.supports_forecast() {
        return Err(QuotaError::ForecastUnsupported);
    }

    Ok(offsets_hours
        .iter()
        .map(|&offset_hours| {
            let shifted_start = window.start.saturating_add(offset_hours.saturating_mul(3600));
            let usage = gpu_hours(records, shifted_start, window.end);
            ForecastPoint {
                offset_hours,
                usage,
                remaining: quota - usage,
            }
        })
        .collect())
}
