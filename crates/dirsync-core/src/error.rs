use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Source path {path} lies under protected prefix {prefix}")]
    ProtectedPath { path: PathBuf, prefix: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sync record not found: {0}")]
    RecordNotFound(String),

    #[error("Sync record id already exists: {0}")]
    DuplicateRecord(String),

    #[error("Error loading sync records from {path}: {reason}")]
    RecordsLoadFailed { path: PathBuf, reason: String },

    #[error("Error loading variables from {path}: {reason}")]
    VariablesLoadFailed { path: PathBuf, reason: String },

    #[error("Watcher error at {path}: {reason}")]
    Watch { path: PathBuf, reason: String },
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn watch(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Watch {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
