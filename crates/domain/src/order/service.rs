//! Read access to orders.
//!
//! Orders are written only through the settlement engine, which commits them
//! together with the stock and ledger streams they touch.

use common::AggregateId;
use event_store::{EventEnvelope, EventStore};

use crate::aggregate::Aggregate;
use crate::command::CommandHandler;
use crate::error::DomainError;

use super::Order;

pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    /// Loads an order by ID.
    ///
    /// Returns None if the order doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }

    /// Raw event history of an order, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn history(&self, order_id: AggregateId) -> Result<Vec<EventEnvelope>, DomainError> {
        let events = self
            .handler
            .store()
            .get_events_for_aggregate(order_id)
            .await?;
        if events.is_empty() {
            return Err(DomainError::not_found(Order::aggregate_type(), order_id));
        }
        Ok(events)
    }
}

impl<S: EventStore + Clone> Clone for OrderService<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}
