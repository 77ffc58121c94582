//! Error kinds shared by the index, record store, and catalog.

use thiserror::Error;

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by core data-structure operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// `add` without upsert on an id that is already live.
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// `get`/`delete`/`remove` on an id that is not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// No usable vector could be produced for a text, or a vector has the
    /// wrong dimension or non-finite components.
    #[error("encoding failure: {0}")]
    EncodingFailure(String),

    /// An id is present in the vector index but not the record store, or the
    /// other way around.
    #[error("integrity violation for {id}: {detail}")]
    IntegrityViolation { id: String, detail: String },

    /// A single ingestion row could not be applied.
    #[error("row {row}: {reason}")]
    IngestionRow { row: usize, reason: String },
}

impl CoreError {
    pub(crate) fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        CoreError::EncodingFailure(format!(
            "vector has dimension {actual}, index expects {expected}"
        ))
    }
}
