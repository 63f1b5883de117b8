//! Accounting source for scheduler job records.
//!
//! This crate provides:
//! - Typed parsing of `sacct --json` responses into [`JobRecord`]s
//! - `AccountingSource` trait for pluggable record sources
//! - `SacctSource`, which shells out to `sacct` per partition
//! - `JsonDirSource`, which replays cached `sacct --json` dumps
//!
//! [`JobRecord`]: gpuquota_core::JobRecord

pub mod cache;
pub mod error;
pub mod parser;
pub mod sacct;
pub mod source;

pub use cache::JsonDirSource;
pub use error::AccountingError;
pub use parser::{parse_response, ParsedJobs};
pub use sacct::SacctSource;
pub use source::{AccountingQuery, AccountingSource, Selector};
