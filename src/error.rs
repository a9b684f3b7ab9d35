use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("input not found: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("unsupported input format for {}: expected {expected}", path.display())]
    UnsupportedFormat { path: PathBuf, expected: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
