//! Error types for the sonde core library.

use std::path::PathBuf;

/// Top-level error enum for the sonde core library.
///
/// Per-file problems (`Read`, and extractor failures that never surface as
/// errors at all) are recovered by the pipeline; everything else that reaches
/// the analysis handler boundary fails the job.
#[derive(Debug, thiserror::Error)]
pub enum SondeError {
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    #[error("Unsafe archive entry: {0}")]
    UnsafeArchiveEntry(String),

    #[error("Discovery error at {}: {reason}", root.display())]
    Discovery { root: PathBuf, reason: String },

    #[error("Read error at {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("No handler registered for job type {0:?}")]
    NoHandler(String),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Job cancelled before it started")]
    Cancelled,

    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Task error: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl From<tokio::task::JoinError> for SondeError {
    fn from(err: tokio::task::JoinError) -> Self {
        SondeError::Task(err.to_string())
    }
}

pub type SondeResult<T> = Result<T, SondeError>;
