//! Per-account quota mapping file.
//!
//! The mapping is a JSON document listing `{account, qos, quota, start_date}`
//! per account, either as an array or as an object keyed by account name.
//! Other tooling rewrites this file in place, so it is read under an
//! exclusive `flock` held for the duration of the read.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::job::Timestamp;
use crate::subject::{QuotaSubject, WindowSpec};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MappingDocument {
    List(Vec<ListedAccount>),
    Keyed(BTreeMap<String, KeyedAccount>),
}

#[derive(Debug, Deserialize)]
struct ListedAccount {
    account: String,
    qos: String,
    quota: f64,
    start_date: String,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    qos: String,
    quota: f64,
    start_date: String,
}

/// One account's quota allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountQuota {
    pub account: String,
    pub qos: String,
    /// Quota in GPU-hours.
    pub quota: f64,
    /// Start of the account's accounting epoch.
    pub start: Timestamp,
}

/// Parsed account mapping, in file order (or account-name order for keyed files).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountMapping {
    pub accounts: Vec<AccountQuota>,
}

impl AccountMapping {
    /// Read and parse the mapping file under an exclusive lock.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut locked = Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            CoreError::Lock {
                path: path.display().to_string(),
                reason: errno.to_string(),
            }
        })?;
        debug!(path = %path.display(), "acquired account mapping lock");

        let mut raw = String::new();
        locked.read_to_string(&mut raw)?;
        drop(locked);

        let mapping = Self::parse(&raw)?;
        info!(
            path = %path.display(),
            accounts = mapping.accounts.len(),
            "loaded account mapping"
        );
        Ok(mapping)
    }

    /// Parse a mapping document from a JSON string.
    pub fn parse(raw: &str) -> Result<Self> {
        let document: MappingDocument = serde_json::from_str(raw)?;

        let listed: Vec<ListedAccount> = match document {
            MappingDocument::List(items) => items,
            MappingDocument::Keyed(map) => map
                .into_iter()
                .map(|(account, entry)| ListedAccount {
                    account,
                    qos: entry.qos,
                    quota: entry.quota,
                    start_date: entry.start_date,
                })
                .collect(),
        };

        let mut accounts = Vec::with_capacity(listed.len());
        for item in listed {
            if item.quota.is_nan() || item.quota <= 0.0 {
                return Err(CoreError::Mapping(format!(
                    "account '{}' has non-positive quota {}",
                    item.account, item.quota
                )));
            }
            let start = parse_start_date(&item.start_date).ok_or_else(|| {
                CoreError::Mapping(format!(
                    "account '{}' has unparseable start_date '{}'",
                    item.account, item.start_date
                ))
            })?;
            accounts.push(AccountQuota {
                account: item.account,
                qos: item.qos,
                quota: item.quota,
                start,
            });
        }

        Ok(Self { accounts })
    }

    /// Build one anchored-window subject per account.
    pub fn subjects(&self, grace_hours: i64) -> Vec<QuotaSubject> {
        self.accounts
            .iter()
            .map(|a| {
                QuotaSubject::account(
                    a.account.clone(),
                    a.qos.clone(),
                    a.quota,
                    WindowSpec::Anchored { start: a.start },
                )
                .with_grace_hours(grace_hours)
            })
            .collect()
    }
}

/// Formats accepted for `start_date`, interpreted in local time unless
/// the string carries an offset.
const LOCAL_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d-%H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

fn parse_start_date(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }

    let naive = LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
}
