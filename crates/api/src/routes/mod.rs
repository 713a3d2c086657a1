//! HTTP handlers and the state they share.

pub mod admin;
pub mod deliveries;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod wallets;

use std::sync::Arc;

use event_store::EventStore;
use projections::{DeliveryBoardView, DriverEarningsView, ProjectionProcessor};
use settlement::OrderEngine;
use uuid::Uuid;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub engine: OrderEngine<S>,
    pub projection_processor: Arc<ProjectionProcessor<S>>,
    pub delivery_board: DeliveryBoardView,
    pub driver_earnings: DriverEarningsView,
}

impl<S: EventStore + Clone> AppState<S> {
    /// Brings the read models up to date with the store.
    pub async fn refresh_views(&self) -> Result<(), ApiError> {
        self.projection_processor.run_catch_up().await?;
        Ok(())
    }
}

/// Parses a UUID path segment into a typed id.
pub(crate) fn parse_id<T: From<Uuid>>(what: &str, raw: &str) -> Result<T, ApiError> {
    Uuid::parse_str(raw)
        .map(T::from)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} id '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AggregateId, DriverId};

    #[test]
    fn test_parse_id() {
        let raw = "6d8f0d4e-2a55-4b8e-9c1f-0f4a3b2c1d0e";
        let id: AggregateId = parse_id("order", raw).unwrap();
        assert_eq!(id.to_string(), raw);

        let err = parse_id::<DriverId>("driver", "nope").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg.contains("driver")));
    }
}
