//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, DriverId, MerchantId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::values::{GeoPoint, Money};

use super::{
    Actor, DeliveryInfo, LineItem, OrderPrices, OrderStatus, Payment, RouteLeg, VerificationCode,
};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Checkout succeeded; the order starts in `PENDING`.
    OrderPlaced(Box<OrderPlacedData>),

    /// The order moved to a new status. Exactly one per transition.
    StatusChanged(StatusChangedData),

    /// A driver picked the order up.
    DriverAssigned(DriverAssignedData),

    /// The driver covered a leg (to the merchant, or to the customer).
    LegTravelled(LegTravelledData),

    /// Payment collected on delivery.
    PaymentCompleted(PaymentCompletedData),

    /// The order was handed to the customer.
    OrderDelivered(OrderDeliveredData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "StatusChanged",
            OrderEvent::DriverAssigned(_) => "DriverAssigned",
            OrderEvent::LegTravelled(_) => "LegTravelled",
            OrderEvent::PaymentCompleted(_) => "PaymentCompleted",
            OrderEvent::OrderDelivered(_) => "OrderDelivered",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub user_id: UserId,
    pub merchant_id: MerchantId,
    pub zone_id: String,
    pub items: Vec<LineItem>,
    pub prices: OrderPrices,
    pub delivery_info: DeliveryInfo,
    /// Merchant location at checkout time.
    pub pickup_location: GeoPoint,
    pub pickup_code: VerificationCode,
    pub delivery_code: VerificationCode,
    pub payment: Option<Payment>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverAssignedData {
    pub driver_id: DriverId,
    /// Where the driver was when accepting, if reported.
    pub start_location: Option<GeoPoint>,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegTravelledData {
    pub from: GeoPoint,
    pub to: GeoPoint,
    pub leg: RouteLeg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedData {
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDeliveredData {
    pub driver_id: DriverId,
    pub delivered_at: DateTime<Utc>,
    /// `None` when the order had no delivery estimate.
    pub on_time: Option<bool>,
    /// Amount credited to the driver's wallet for this order.
    pub driver_earnings: Money,
}

impl OrderEvent {
    pub fn status_changed(from: OrderStatus, to: OrderStatus, actor: Actor, at: DateTime<Utc>) -> Self {
        OrderEvent::StatusChanged(StatusChangedData {
            from,
            to,
            actor,
            changed_at: at,
        })
    }

    pub fn leg_travelled(from: GeoPoint, to: GeoPoint, leg: RouteLeg) -> Self {
        OrderEvent::LegTravelled(LegTravelledData { from, to, leg })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacently_tagged_wire_format() {
        let event = OrderEvent::status_changed(
            OrderStatus::Pending,
            OrderStatus::AcceptedByMerchant,
            Actor::Admin,
            Utc::now(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StatusChanged");
        assert_eq!(json["data"]["to"], "ACCEPTED_BY_MERCHANT");

        let back: OrderEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "StatusChanged");
    }

    #[test]
    fn order_events_carry_no_idempotency_key() {
        let event = OrderEvent::PaymentCompleted(PaymentCompletedData {
            completed_at: Utc::now(),
        });
        assert!(event.idempotency_key().is_none());
    }
}
