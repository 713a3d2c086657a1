use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The stream moved on since it was read.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// An envelope carried an idempotency key that is already stored.
    #[error("Idempotency key already recorded: {key}")]
    DuplicateIdempotencyKey { key: String },

    /// The batch was malformed (empty, mixed streams, non-sequential versions).
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Returns true when re-reading the affected streams and retrying may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EventStoreError::ConcurrencyConflict { .. }
                | EventStoreError::DuplicateIdempotencyKey { .. }
        )
    }
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
