//! Error types for accounting queries and record parsing.

/// Errors raised while querying or parsing the accounting source.
#[derive(Debug, thiserror::Error)]
pub enum AccountingError {
    /// The accounting command could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The accounting command exited non-zero.
    #[error("{program} exited with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The accounting command did not finish in time.
    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    /// The response as a whole could not be understood.
    #[error("malformed accounting response: {0}")]
    MalformedResponse(String),

    /// A single job entry is missing required fields. Siblings are unaffected.
    #[error("malformed job record {job_id}: {reason}")]
    MalformedRecord { job_id: String, reason: String },

    /// Filesystem I/O error (cached dumps).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for accounting operations.
pub type Result<T> = std::result::Result<T, AccountingError>;
