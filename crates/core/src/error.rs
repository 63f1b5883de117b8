use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Account mapping error: {0}")]
    Mapping(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to lock {path}: {reason}")]
    Lock { path: String, reason: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
