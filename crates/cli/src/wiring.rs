//! Build the engine's collaborators from config and flags.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use gpuquota_accounting::{AccountingSource, JsonDirSource, SacctSource};
use gpuquota_core::{Config, WindowSpec};
use gpuquota_engine::{
    DryRunControl, MonitorSettings, NoticeNotifier, QuotaNotifier, ScancelControl,
    SchedulerControl,
};
use gpuquota_notify::{Dispatcher, EmailNotifier, NoticeTemplates, Notifier, WebhookNotifier};

use crate::cli::{GlobalArgs, WindowArgs};

/// Apply per-run flag overrides on top of the environment config.
pub fn apply_overrides(config: &mut Config, global: &GlobalArgs) {
    if !global.partitions.is_empty() {
        config.quota.partitions = global.partitions.clone();
    }
    if let Some(quota) = global.quota {
        config.quota.gpu_hours = quota;
    }
    if let Some(dir) = &global.sacct_cache {
        config.accounting.cache_dir = Some(dir.clone());
    }
}

/// Per-user window: flags first, then config. Zero minutes means calendar.
pub fn user_window(config: &Config, window: Option<&WindowArgs>) -> WindowSpec {
    if let Some(args) = window {
        if args.calendar {
            return WindowSpec::Calendar;
        }
        if let Some(days) = args.rolling_days {
            return WindowSpec::rolling_days(days);
        }
    }
    match config.quota.rolling_window_minutes {
        0 => WindowSpec::Calendar,
        minutes => WindowSpec::Rolling { minutes },
    }
}

pub fn monitor_settings(config: &Config, user_window: WindowSpec) -> MonitorSettings {
    MonitorSettings {
        partitions: config.quota.partitions.clone(),
        quota: config.quota.gpu_hours,
        user_window,
        discovery_window_minutes: config.quota.monitor_window_minutes,
        grace_hours: config.quota.grace_hours,
        forecast_offsets: config.quota.forecast_offsets_hours.clone(),
    }
}

pub fn accounting_source(config: &Config) -> Arc<dyn AccountingSource> {
    match &config.accounting.cache_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "replaying cached sacct dumps");
            Arc::new(JsonDirSource::new(dir.clone()))
        }
        None => Arc::new(SacctSource::new(
            config.accounting.sacct_bin.clone(),
            Duration::from_secs(config.accounting.timeout_secs),
        )),
    }
}

pub fn scheduler_control(config: &Config, dry_run: bool) -> Arc<dyn SchedulerControl> {
    if dry_run {
        Arc::new(DryRunControl)
    } else {
        Arc::new(ScancelControl::new(
            config.accounting.scancel_bin.clone(),
            Duration::from_secs(config.accounting.timeout_secs),
        ))
    }
}

/// Email and webhook channels as configured. A dry run gets none.
pub fn quota_notifier(config: &Config, dry_run: bool) -> Result<Arc<dyn QuotaNotifier>> {
    let notify = &config.notify;

    let templates = match &notify.template_dir {
        Some(dir) => NoticeTemplates::from_dir(dir)
            .with_context(|| format!("failed to load notice templates from {}", dir.display()))?,
        None => NoticeTemplates::default(),
    };

    let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
    if dry_run {
        info!("dry run: notices will be rendered but not sent");
    } else {
        if let Some(host) = &notify.smtp_host {
            let email = EmailNotifier::from_config(
                host,
                notify.smtp_port,
                notify.smtp_tls,
                &notify.from,
                &notify.admin_emails,
            )
            .context("invalid SMTP configuration")?;
            channels.push(Box::new(email));
        }
        if let Some(url) = &notify.webhook_url {
            let headers: HashMap<String, String> = notify
                .webhook_headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            let webhook = WebhookNotifier::new(url, notify.webhook_method.as_deref(), headers)
                .context("invalid webhook configuration")?;
            channels.push(Box::new(webhook));
        }
        if channels.is_empty() {
            warn!("no notification channels configured; notices will be dropped");
        }
    }

    let dispatcher = Dispatcher::new(channels, templates);
    info!(channels = ?dispatcher.channel_names(), "notice dispatcher ready");

    Ok(Arc::new(NoticeNotifier::new(
        dispatcher,
        notify.email_domain.clone(),
        notify.admin_emails.clone(),
        &config.quota.partitions,
    )))
}
