use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// GPU-hour quota accounting and enforcement for Slurm partitions.
///
/// Settings come from the environment (and `.env`); flags given here
/// override them for a single run.
#[derive(Parser, Debug)]
#[command(name = "gpuquota", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Config profile; `PROD` reads `PROD_<KEY>` before `<KEY>`
    #[arg(long, global = true, env = "GPUQUOTA_PROFILE")]
    pub profile: Option<String>,

    /// Partition to meter (repeatable; overrides PARTITIONS)
    #[arg(long = "partition", global = true)]
    pub partitions: Vec<String>,

    /// Quota in GPU-hours (overrides QUOTA_GPU_HOURS)
    #[arg(long, global = true)]
    pub quota: Option<f64>,

    /// Replay cached `sacct --json` dumps from this directory
    #[arg(long, global = true)]
    pub sacct_cache: Option<PathBuf>,

    /// Log cancellations instead of running scancel, and send no notices
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct WindowArgs {
    /// Rolling window length in days (overrides ROLLING_WINDOW_MINUTES)
    #[arg(long, conflicts_with = "calendar")]
    pub rolling_days: Option<i64>,

    /// Meter usage from the start of the current month instead
    #[arg(long)]
    pub calendar: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a usage report for one user
    Check {
        /// User to report on
        #[arg(long, short, env = "USER")]
        user: String,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Show how much quota frees up over the coming hours
    Forecast {
        #[arg(long, short, env = "USER")]
        user: String,

        /// Offsets in hours (overrides FORECAST_OFFSETS_HOURS)
        #[arg(long, value_delimiter = ',')]
        offsets: Vec<i64>,

        /// Rolling window length in days (overrides ROLLING_WINDOW_MINUTES)
        #[arg(long)]
        rolling_days: Option<i64>,
    },

    /// Enforce per-user quotas for everyone with active jobs
    Monitor {
        #[command(flatten)]
        window: WindowArgs,

        /// Repeat every N minutes until interrupted instead of running once
        #[arg(long)]
        interval_minutes: Option<u64>,
    },

    /// Enforce per-account quotas from the account mapping file
    MonitorAccounts {
        /// Mapping file (overrides ACCOUNT_MAPPING_PATH)
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Repeat every N minutes until interrupted instead of running once
        #[arg(long)]
        interval_minutes: Option<u64>,
    },
}
