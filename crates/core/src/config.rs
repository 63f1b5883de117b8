use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Comma-separated `Name=Value` pairs; items without `=` are dropped.
fn profiled_env_pairs(profile: &str, key: &str) -> BTreeMap<String, String> {
    profiled_env_list(profile, key, "")
        .iter()
        .filter_map(|item| item.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

/// Comma-separated list; blank items are dropped.
fn profiled_env_list(profile: &str, key: &str, default: &str) -> Vec<String> {
    profiled_env_or(profile, key, default)
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub quota: QuotaConfig,
    pub accounting: AccountingConfig,
    pub mapping: MappingConfig,
    pub notify: NotifyConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `GPUQUOTA_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("GPUQUOTA_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            quota: QuotaConfig::from_env_profiled(p),
            accounting: AccountingConfig::from_env_profiled(p),
            mapping: MappingConfig::from_env_profiled(p),
            notify: NotifyConfig::from_env_profiled(p),
        }
    }

    /// Check values that env parsing and flag overrides can't rule out.
    pub fn validate(&self) -> Result<()> {
        self.quota.validate()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  quota:       {} GPU h, rolling={}min, monitor={}min, grace={}h",
            self.quota.gpu_hours,
            self.quota.rolling_window_minutes,
            self.quota.monitor_window_minutes,
            self.quota.grace_hours
        );
        tracing::info!("  partitions:  {}", self.quota.partitions.join(","));
        tracing::info!(
            "  accounting:  sacct={}, scancel={}, timeout={}s",
            self.accounting.sacct_bin,
            self.accounting.scancel_bin,
            self.accounting.timeout_secs
        );
        tracing::info!(
            "  mapping:     {}",
            self.mapping
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string())
        );
        tracing::info!(
            "  notify:      smtp={}, webhook={}",
            self.notify.smtp_host.as_deref().unwrap_or("(none)"),
            if self.notify.webhook_url.is_some() { "configured" } else { "(none)" }
        );
    }
}

// ── Quota policy ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Per-user quota in GPU-hours.
    pub gpu_hours: f64,
    /// Per-user rolling window. Zero selects the calendar-month window.
    pub rolling_window_minutes: i64,
    /// Lookback used by the admin monitor to discover active users.
    pub monitor_window_minutes: i64,
    pub grace_hours: i64,
    pub forecast_offsets_hours: Vec<i64>,
    pub partitions: Vec<String>,
}

impl QuotaConfig {
    fn from_env_profiled(p: &str) -> Self {
        let forecast_offsets_hours = profiled_env_list(p, "FORECAST_OFFSETS_HOURS", "12,24,72,168")
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        Self {
            gpu_hours: profiled_env_parse(p, "QUOTA_GPU_HOURS", 500.0),
            rolling_window_minutes: profiled_env_parse(p, "ROLLING_WINDOW_MINUTES", 30 * 24 * 60),
            monitor_window_minutes: profiled_env_parse(p, "MONITOR_WINDOW_MINUTES", 30),
            grace_hours: profiled_env_parse(p, "GRACE_HOURS", 24),
            forecast_offsets_hours,
            partitions: profiled_env_list(p, "PARTITIONS", "pli-c"),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.gpu_hours.is_finite() || self.gpu_hours <= 0.0 {
            return Err(CoreError::Config(format!(
                "quota must be a positive number of GPU hours, got {}",
                self.gpu_hours
            )));
        }
        if self.grace_hours < 0 {
            return Err(CoreError::Config(format!(
                "grace period must not be negative, got {}h",
                self.grace_hours
            )));
        }
        if self.rolling_window_minutes < 0 {
            return Err(CoreError::Config(format!(
                "rolling window must not be negative, got {}min",
                self.rolling_window_minutes
            )));
        }
        if self.monitor_window_minutes <= 0 {
            return Err(CoreError::Config(format!(
                "monitor window must be positive, got {}min",
                self.monitor_window_minutes
            )));
        }
        Ok(())
    }
}

// ── Accounting source / scheduler control ─────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountingConfig {
    pub sacct_bin: String,
    pub scancel_bin: String,
    pub timeout_secs: u64,
    /// Read cached `sacct --json` dumps from here instead of calling sacct.
    pub cache_dir: Option<PathBuf>,
    /// Bound on a whole monitor cycle; zero disables.
    pub cycle_timeout_secs: u64,
}

impl AccountingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            sacct_bin: profiled_env_or(p, "SACCT_BIN", "sacct"),
            scancel_bin: profiled_env_or(p, "SCANCEL_BIN", "scancel"),
            timeout_secs: profiled_env_parse(p, "ACCOUNTING_TIMEOUT_SECS", 120),
            cache_dir: profiled_env_opt(p, "SACCT_CACHE_DIR").map(PathBuf::from),
            cycle_timeout_secs: profiled_env_parse(p, "CYCLE_TIMEOUT_SECS", 0),
        }
    }
}

// ── Account mapping ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    pub path: Option<PathBuf>,
}

impl MappingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            path: profiled_env_opt(p, "ACCOUNT_MAPPING_PATH").map(PathBuf::from),
        }
    }
}

// ── Notifications ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_tls: Option<bool>,
    pub from: String,
    /// Users are mailed at `<user>@<email_domain>`.
    pub email_domain: String,
    pub admin_emails: Vec<String>,
    pub webhook_url: Option<String>,
    /// HTTP method for the webhook; `POST` when unset.
    pub webhook_method: Option<String>,
    /// Extra webhook headers. Values may reference `${VAR}` from the environment.
    pub webhook_headers: BTreeMap<String, String>,
    pub template_dir: Option<PathBuf>,
}

impl NotifyConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            smtp_host: profiled_env_opt(p, "SMTP_HOST"),
            smtp_port: profiled_env_opt(p, "SMTP_PORT").and_then(|v| v.parse().ok()),
            smtp_tls: profiled_env_opt(p, "SMTP_TLS").map(|v| v == "true"),
            from: profiled_env_or(p, "NOTIFY_FROM", "gpuquota@localhost"),
            email_domain: profiled_env_or(p, "EMAIL_DOMAIN", "localhost"),
            admin_emails: profiled_env_list(p, "ADMIN_EMAILS", ""),
            webhook_url: profiled_env_opt(p, "NOTIFY_WEBHOOK_URL"),
            webhook_method: profiled_env_opt(p, "NOTIFY_WEBHOOK_METHOD"),
            webhook_headers: profiled_env_pairs(p, "NOTIFY_WEBHOOK_HEADERS"),
            template_dir: profiled_env_opt(p, "NOTICE_TEMPLATE_DIR").map(PathBuf::from),
        }
    }

    pub fn email_configured(&self) -> bool {
        self.smtp_host.is_some()
    }
}
