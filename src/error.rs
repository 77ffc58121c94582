//! Errors surfaced by [`JobStore`](crate::store::JobStore) operations.

use jobscope_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Artifacts failed a version or dimension check on load.
    #[error("corrupt persistence: {reason}")]
    CorruptPersistence { reason: String },

    /// Durable-storage failure (save, row files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for StoreError {
    fn from(err: csv::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl StoreError {
    pub fn corrupt(reason: impl Into<String>) -> Self {
        StoreError::CorruptPersistence {
            reason: reason.into(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
