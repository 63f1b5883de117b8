mod cli;
mod wiring;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{info, warn};

use gpuquota_core::config::load_dotenv;
use gpuquota_core::mapping::AccountMapping;
use gpuquota_core::{Config, WindowSpec};
use gpuquota_engine::report::forecast_table;
use gpuquota_engine::{
    summary_line, CycleReport, EnforcementState, Monitor, QuotaError, SubjectOutcome,
};

use crate::cli::{Cli, Command, GlobalArgs};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = match &cli.global.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    wiring::apply_overrides(&mut config, &cli.global);
    config.validate().context("refusing to enforce with this configuration")?;
    config.log_summary();

    match cli.command {
        Command::Check { user, window } => {
            let window = wiring::user_window(&config, Some(&window));
            let monitor = build_monitor(&config, &cli.global, window)?;
            check(&monitor, &user, cli.global.json).await
        }
        Command::Forecast {
            user,
            offsets,
            rolling_days,
        } => {
            let window = match rolling_days {
                Some(days) => WindowSpec::rolling_days(days),
                None => wiring::user_window(&config, None),
            };
            if !offsets.is_empty() {
                config.quota.forecast_offsets_hours = offsets;
            }
            let monitor = build_monitor(&config, &cli.global, window)?;
            forecast(&monitor, &user, cli.global.json).await
        }
        Command::Monitor {
            window,
            interval_minutes,
        } => {
            let window = wiring::user_window(&config, Some(&window));
            let monitor = build_monitor(&config, &cli.global, window)?;
            let (monitor, json) = (&monitor, cli.global.json);
            let timeout = config.accounting.cycle_timeout_secs;
            repeat(interval_minutes, || async move {
                let cycle = async {
                    monitor
                        .run_user_cycle(&Local::now())
                        .await
                        .context("user monitor cycle failed")
                };
                if let Some(report) = interruptible(cycle, timeout).await? {
                    print_cycle(&report, json)?;
                }
                Ok(())
            })
            .await
        }
        Command::MonitorAccounts {
            mapping,
            interval_minutes,
        } => {
            let path: PathBuf = mapping
                .or_else(|| config.mapping.path.clone())
                .context("no account mapping given; pass --mapping or set ACCOUNT_MAPPING_PATH")?;
            let monitor = build_monitor(&config, &cli.global, wiring::user_window(&config, None))?;
            let (monitor, path, json) = (&monitor, &path, cli.global.json);
            let timeout = config.accounting.cycle_timeout_secs;
            let grace_hours = config.quota.grace_hours;
            repeat(interval_minutes, || async move {
                // Re-read each cycle to pick up edits.
                let subjects = AccountMapping::load(path)
                    .with_context(|| format!("failed to load account mapping {}", path.display()))?
                    .subjects(grace_hours);
                let cycle = async {
                    Ok(monitor.run_account_cycle(&subjects, &Local::now()).await)
                };
                if let Some(report) = interruptible(cycle, timeout).await? {
                    print_cycle(&report, json)?;
                }
                Ok(())
            })
            .await
        }
    }
}

fn build_monitor(
    config: &Config,
    global: &GlobalArgs,
    user_window: WindowSpec,
) -> Result<Monitor> {
    Ok(Monitor::new(
        wiring::accounting_source(config),
        wiring::quota_notifier(config, global.dry_run)?,
        wiring::scheduler_control(config, global.dry_run),
        wiring::monitor_settings(config, user_window),
    ))
}

async fn check(monitor: &Monitor, user: &str, json: bool) -> Result<()> {
    let subject = monitor.user_subject(user);
    let assessment = monitor
        .assess(&subject, &Local::now())
        .await
        .with_context(|| format!("failed to compute usage for {}", subject))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
    } else {
        println!("{}", assessment.report);
    }
    Ok(())
}

async fn forecast(monitor: &Monitor, user: &str, json: bool) -> Result<()> {
    let subject = monitor.user_subject(user);
    let assessment = monitor
        .assess(&subject, &Local::now())
        .await
        .with_context(|| format!("failed to compute usage for {}", subject))?;
    let points = assessment.forecast.ok_or(QuotaError::ForecastUnsupported)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&points)?);
    } else {
        println!("{}", summary_line(&subject, &assessment.evaluation));
        print!("{}", forecast_table(&points));
    }
    Ok(())
}

fn print_cycle(report: &CycleReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for entry in &report.subjects {
        match &entry.outcome {
            SubjectOutcome::Evaluated {
                assessment,
                actions,
            } => {
                println!("{}", summary_line(&entry.subject, &assessment.evaluation));
                for action in actions {
                    println!("    {}", serde_json::to_string(action)?);
                }
            }
            SubjectOutcome::Unknown { reason } => {
                println!("{} | usage unknown: {}", entry.subject, reason);
            }
        }
    }
    println!(
        "{} subjects: {} ok, {} warn, {} cancel, {} unknown; {} jobs cancelled",
        report.subjects.len(),
        report.count(EnforcementState::Ok),
        report.count(EnforcementState::Warn),
        report.count(EnforcementState::Cancel),
        report.unknown(),
        report.cancelled_jobs().len()
    );
    Ok(())
}

/// Run `cycle` once, or every `interval_minutes` until Ctrl-C.
async fn repeat<F, Fut>(interval_minutes: Option<u64>, mut cycle: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let Some(minutes) = interval_minutes else {
        return cycle().await;
    };
    if minutes == 0 {
        bail!("--interval-minutes must be positive");
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(minutes * 60));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, exiting");
                return Ok(());
            }
        }
        // Keep ticking after a failed cycle.
        if let Err(e) = cycle().await {
            warn!(error = %format!("{e:#}"), "monitor cycle failed");
        }
    }
}

/// Bound a cycle by `timeout_secs` (zero for none) and Ctrl-C.
///
/// `Ok(None)` means the cycle was abandoned. Notices and cancellations
/// already issued stay issued.
async fn interruptible<T>(
    cycle: impl Future<Output = Result<T>>,
    timeout_secs: u64,
) -> Result<Option<T>> {
    let bounded = async {
        if timeout_secs == 0 {
            return Some(cycle.await);
        }
        match tokio::time::timeout(Duration::from_secs(timeout_secs), cycle).await {
            Ok(result) => Some(result),
            Err(_) => {
                warn!(timeout_secs, "cycle timed out, remaining subjects skipped");
                None
            }
        }
    };

    tokio::select! {
        outcome = bounded => outcome.transpose(),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, abandoning cycle");
            Ok(None)
        }
    }
}
