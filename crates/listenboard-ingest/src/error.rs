use std::path::PathBuf;

use serde::Serialize;

/// Failure to ingest one history file. Malformed entries inside a file are
/// never errors; they are dropped by validation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid history JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

/// A per-file failure recorded in an import or sync report.
#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub file: String,
    pub message: String,
}

impl FileError {
    pub fn new(file: impl Into<String>, error: &Error) -> Self {
        Self {
            file: file.into(),
            message: error.to_string(),
        }
    }
}
