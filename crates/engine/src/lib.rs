//! GPU-hour quota accounting and enforcement.
//!
//! This crate provides:
//! - Window policy: rolling, calendar-month and anchored usage windows
//! - Usage aggregation over job records and active-job discovery
//! - Forecasts of quota recovery as a rolling window slides forward
//! - The OK / WARN / CANCEL evaluator with its day-over-day grace check
//! - The monitor loop that turns evaluations into notices and cancellations
//!
//! Nothing here is persisted: every cycle recomputes from the accounting
//! source, so repeated evaluations over the same data agree.

pub mod control;
pub mod enforcement;
pub mod error;
pub mod forecast;
pub mod monitor;
pub mod notice;
pub mod report;
pub mod usage;
pub mod window;

pub use control::{ControlError, DryRunControl, ScancelControl, SchedulerControl};
pub use enforcement::{evaluate, evaluate_in, EnforcementState, Evaluation};
pub use error::{QuotaError, Result};
pub use forecast::{forecast, ForecastPoint, DEFAULT_FORECAST_OFFSETS};
pub use monitor::{
    Action, Assessment, CycleMode, CycleReport, Monitor, MonitorSettings, QuotaNotifier,
    SubjectOutcome, SubjectReport,
};
pub use notice::NoticeNotifier;
pub use report::{progress_bar, summary_line, usage_report};
pub use window::{resolve, Window};
