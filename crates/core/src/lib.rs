pub mod config;
pub mod error;
pub mod job;
pub mod mapping;
pub mod subject;

pub use config::Config;
pub use error::*;
pub use job::*;
pub use subject::*;
