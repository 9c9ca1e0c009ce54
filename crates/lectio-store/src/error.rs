//! Store error types.

use std::path::PathBuf;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("Corrupt script at {path}: {reason}")]
    CorruptScript { path: PathBuf, reason: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),
}

impl StoreError {
    pub fn corrupt_script(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptScript {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
