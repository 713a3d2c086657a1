//! Domain error types.

use event_store::EventStoreError;
use thiserror::Error;

use crate::inventory::InventoryError;
use crate::order::OrderError;
use crate::wallet::WalletError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn not_found(aggregate_type: &'static str, aggregate_id: impl ToString) -> Self {
        DomainError::AggregateNotFound {
            aggregate_type,
            aggregate_id: aggregate_id.to_string(),
        }
    }

    /// Returns true if the operation lost an optimistic-concurrency race and
    /// may succeed when retried against fresh state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::EventStore(e) if e.is_conflict())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AggregateId;
    use event_store::Version;

    #[test]
    fn only_store_conflicts_are_retryable() {
        let conflict = DomainError::from(EventStoreError::ConcurrencyConflict {
            aggregate_id: AggregateId::new(),
            expected: Version::new(1),
            actual: Version::new(2),
        });
        assert!(conflict.is_conflict());

        let duplicate = DomainError::from(EventStoreError::DuplicateIdempotencyKey {
            key: "o-1:earnings".into(),
        });
        assert!(duplicate.is_conflict());

        assert!(!DomainError::not_found("Order", "o-1").is_conflict());
    }

    #[test]
    fn not_found_message_names_the_stream() {
        let err = DomainError::not_found("Product", "p-42");
        assert_eq!(
            err.to_string(),
            "Aggregate not found: Product with id p-42"
        );
    }
}
