// src/errors.rs

use std::fmt;
use thiserror::Error;

use crate::models::EntityKind;

/// Failures raised by the record store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Write rejected for record {0}")]
    WriteRejected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by the matching and merge operations.
#[derive(Debug, Error)]
pub enum DedupeError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("Invalid '{field}': {reason}")]
    Validation { field: &'static str, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DedupeError {
    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        DedupeError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        DedupeError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

pub type DedupeResult<T> = Result<T, DedupeError>;

/// Non-fatal notice that a finder scanned more records than the configured bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleWarning {
    pub kind: EntityKind,
    pub scanned: usize,
    pub threshold: usize,
    /// Pairwise comparisons the scan implies (n for a single target, n² for clustering).
    pub comparisons: u64,
}

impl fmt::Display for ScaleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "full scan of {} {} records exceeds bound of {} (~{} comparisons)",
            self.scanned, self.kind, self.threshold, self.comparisons
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_the_id() {
        let err = DedupeError::not_found(EntityKind::Company, "co42");
        assert_eq!(err.to_string(), "company not found: co42");
    }

    #[test]
    fn test_validation_names_the_field() {
        let err = DedupeError::validation("lastName", "must not be empty");
        assert_eq!(err.to_string(), "Invalid 'lastName': must not be empty");
    }
}
