//! Store error types

use std::path::PathBuf;

use thiserror::Error;

/// Resource store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Waiting for a resource lock was cancelled
    #[error("waiting for lock on '{key}' was cancelled")]
    Cancelled { key: String },

    /// The operation needs the resource to be unlocked
    #[error("resource '{key}' is locked by an active worker")]
    ResourceLocked { key: String },

    /// Backend read/write failure
    #[error("registry io error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Entry could not be (de)serialized
    #[error("registry entry '{key}' encoding error: {source}")]
    Encoding {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Registry location is unusable
    #[error("invalid registry path '{}': {message}", path.display())]
    InvalidPath { path: PathBuf, message: String },
}

impl StoreError {
    pub(crate) fn io(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }

    pub(crate) fn encoding(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Encoding {
            key: key.into(),
            source,
        }
    }

    /// Returns true if this error only reports cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Store Result type alias
pub type Result<T> = std::result::Result<T, StoreError>;
