//! Error types for quota computations.

use gpuquota_accounting::AccountingError;

/// Errors surfaced by the quota engine.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// The window policy cannot produce a valid `[start, end]`.
    #[error("invalid window: {0}")]
    InvalidWindow(String),

    /// The subject's quota or grace period cannot be enforced.
    #[error("invalid quota: {0}")]
    InvalidQuota(String),

    /// Forecasting was requested for a calendar window, which resets
    /// at the month boundary instead of sliding.
    #[error("forecast is not supported for calendar windows")]
    ForecastUnsupported,

    /// The accounting source failed; no usage can be computed.
    #[error("accounting source error: {0}")]
    Accounting(#[from] AccountingError),
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, QuotaError>;
