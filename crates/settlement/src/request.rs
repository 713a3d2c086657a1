//! Inputs and outputs of the engine's operations.

use common::{ProductId, UserId};
use domain::{Actor, DeliveryInfo, GeoPoint, Order, OrderPrices, OrderStatus, Payment, Transaction};
use serde::{Deserialize, Serialize};

/// One requested line of a checkout. The price is looked up, not submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A customer's checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub zone_id: String,
    pub items: Vec<CheckoutItem>,
    pub delivery_info: DeliveryInfo,
    /// Prices as shown to the customer; checked against live prices and the
    /// zone's fee.
    pub prices: OrderPrices,
    #[serde(default)]
    pub payment: Option<Payment>,
    #[serde(default)]
    pub pickup_code: Option<String>,
    #[serde(default)]
    pub delivery_code: Option<String>,
}

/// Merges lines for the same product, keeping first-seen order.
pub(crate) fn merge_checkout_items(items: &[CheckoutItem]) -> Vec<CheckoutItem> {
    let mut merged: Vec<CheckoutItem> = Vec::with_capacity(items.len());
    for item in items {
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
            None => merged.push(*item),
        }
    }
    merged
}

/// A request to move an order to another status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub actor: Actor,
    pub target: OrderStatus,
    #[serde(default)]
    pub pickup_code: Option<String>,
    #[serde(default)]
    pub delivery_code: Option<String>,
    /// The acting driver's current position.
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

impl TransitionRequest {
    pub fn new(actor: Actor, target: OrderStatus) -> Self {
        Self {
            actor,
            target,
            pickup_code: None,
            delivery_code: None,
            location: None,
        }
    }

    pub fn with_pickup_code(mut self, code: impl Into<String>) -> Self {
        self.pickup_code = Some(code.into());
        self
    }

    pub fn with_delivery_code(mut self, code: impl Into<String>) -> Self {
        self.delivery_code = Some(code.into());
        self
    }

    pub fn with_location(mut self, location: GeoPoint) -> Self {
        self.location = Some(location);
        self
    }
}

/// The order after a transition, and the earnings credit if it completed.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: Order,
    pub earnings: Option<Transaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_lines_are_merged() {
        let a = ProductId::new();
        let b = ProductId::new();
        let merged = merge_checkout_items(&[
            CheckoutItem {
                product_id: a,
                quantity: 1,
            },
            CheckoutItem {
                product_id: b,
                quantity: 2,
            },
            CheckoutItem {
                product_id: a,
                quantity: 3,
            },
        ]);
        assert_eq!(
            merged,
            vec![
                CheckoutItem {
                    product_id: a,
                    quantity: 4
                },
                CheckoutItem {
                    product_id: b,
                    quantity: 2
                },
            ]
        );
    }

    #[test]
    fn transition_request_from_json() {
        let json = serde_json::json!({
            "actor": {"role": "driver", "id": "6d8f0d4e-2a55-4b8e-9c1f-0f4a3b2c1d0e"},
            "target": "ACCEPTED_BY_DRIVER",
            "pickup_code": "ab12cd",
            "location": {"lat": 9.0, "lng": 38.7}
        });
        let request: TransitionRequest = serde_json::from_value(json).unwrap();
        assert!(matches!(request.actor, Actor::Driver(_)));
        assert_eq!(request.target, OrderStatus::AcceptedByDriver);
        assert_eq!(request.pickup_code.as_deref(), Some("ab12cd"));
        assert!(request.delivery_code.is_none());
    }
}
