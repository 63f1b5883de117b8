//! Human-readable usage reports.
//!
//! The same text is printed by `gpuquota check` and attached to warning
//! and cancellation notices.

use chrono::{Local, TimeZone};

use gpuquota_core::{QuotaSubject, SubjectKind, Timestamp, WindowSpec};

use crate::enforcement::Evaluation;
use crate::forecast::ForecastPoint;

const BAR_WIDTH: usize = 30;

/// `[#####-----] 50.00%`. The bar saturates at full; the percentage does not.
pub fn progress_bar(fraction: f64) -> String {
    let clamped = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else if fraction > 0.0 {
        1.0
    } else {
        0.0
    };
    let filled = (clamped * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:.2}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        fraction * 100.0
    )
}

/// Local wall-clock rendering used throughout reports.
pub fn format_timestamp(ts: Timestamp) -> String {
    match Local.timestamp_opt(ts, 0).earliest() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

fn used_fraction(evaluation: &Evaluation) -> f64 {
    if evaluation.quota > 0.0 {
        evaluation.used / evaluation.quota
    } else if evaluation.used > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

fn subject_line(subject: &QuotaSubject) -> String {
    match &subject.kind {
        SubjectKind::User { name } => format!("User: {}", name),
        SubjectKind::Account { account, qos } => format!("Account: {} (QOS: {})", account, qos),
    }
}

/// One-line status, logged for every evaluated subject.
pub fn summary_line(subject: &QuotaSubject, evaluation: &Evaluation) -> String {
    format!(
        "{} | Remaining Quota: {:.2} GPUhrs | {}",
        subject_line(subject),
        evaluation.remaining_now,
        evaluation.state
    )
}

/// Forecast table, one line per offset.
pub fn forecast_table(points: &[ForecastPoint]) -> String {
    let mut out = String::from("Available Quota Forecast:\n");
    for point in points {
        out.push_str(&format!(
            "+{} hrs:  {:.2} GPU hour\n",
            point.offset_hours, point.remaining
        ));
    }
    out
}

/// Full multi-line usage report for one evaluated subject.
pub fn usage_report(
    subject: &QuotaSubject,
    evaluation: &Evaluation,
    forecast: Option<&[ForecastPoint]>,
    partitions: &[String],
) -> String {
    let partition = if partitions.is_empty() {
        "(all)".to_string()
    } else {
        partitions.join(",")
    };
    let fraction = used_fraction(evaluation);

    let mut lines = vec![
        "== High Priority GPU Usage Report ==\n".to_string(),
        subject_line(subject),
        format!("Partition: {}", partition),
        format!("Cycle Start:    {}", format_timestamp(evaluation.window.start)),
        format!("Cycle End:      {}", format_timestamp(evaluation.window.end)),
        format!("HP GPU hrs used:    {:.2} hours.", evaluation.used),
        format!("Remaining HP hrs:   {:.2} hours.\n", evaluation.remaining_now),
        progress_bar(fraction),
    ];

    if evaluation.remaining_now < 0.0 {
        lines.push(format!(
            "\nWARNING: YOU HAVE EXCEEDED YOUR HP GPU QUOTA!\nJobs submitted to {} will be automatically CANCELLED.",
            partition
        ));
    }

    match evaluation.window.spec {
        WindowSpec::Rolling { minutes } => {
            let span = if minutes >= 24 * 60 {
                format!("{} days", minutes / (24 * 60))
            } else {
                format!("{} minutes", minutes)
            };
            lines.push(format!(
                "\nQuota of high priority GPU hrs is calculated over a rolling window of {}.",
                span
            ));
        }
        WindowSpec::Anchored { start } => {
            lines.push(format!(
                "\nQuota of high priority GPU hrs is calculated since {}.",
                format_timestamp(start)
            ));
        }
        WindowSpec::Calendar => {
            lines.push("GPU quota will be reset at the beginning of the next month.".to_string());
        }
    }

    if let Some(points) = forecast {
        if !points.is_empty() {
            lines.push(forecast_table(points));
        }
    }

    lines.join("\n")
}
