use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GamutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error at {}: {source}", .path.display())]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GamutError {
    /// Attach the offending path to an IO failure.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GamutError::PathIo {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GamutError>;

/// Failure reported by a [`Transform`](crate::pipeline::Transform) invocation.
///
/// Transform failures never abort a reconciliation pass; the affected input is
/// left unrecorded so the next pass retries it.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("failed to write {}: {reason}", .path.display())]
    Write { path: PathBuf, reason: String },
}
