use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Failed to read mirror config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse mirror config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid mirror config {id}: {reason}")]
    InvalidConfig { id: String, reason: String },

    #[error("Duplicate mirror id: {0}")]
    DuplicateMirror(String),

    #[error("Invalid interval expression: {0:?}")]
    InvalidInterval(String),

    #[error("Invalid duration expression: {0:?}")]
    InvalidDuration(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
