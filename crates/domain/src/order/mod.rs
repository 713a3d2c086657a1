//! Order aggregate and related types.

mod aggregate;
mod events;
mod service;
mod state;
mod value_objects;

pub use aggregate::{DRIVER_EARNINGS_PERCENT, Order, PlaceOrder, TransitionContext};
pub use events::{
    DriverAssignedData, LegTravelledData, OrderDeliveredData, OrderEvent, OrderPlacedData,
    PaymentCompletedData, StatusChangedData,
};
pub use service::OrderService;
pub use state::{OrderStatus, StepOwner};
pub use value_objects::{
    Actor, Contact, DeliveryInfo, LineItem, LocationSource, OrderPrices, Payment, PaymentMethod,
    PaymentStatus, RouteLeg, StatusEntry, VerificationCode, merge_line_items,
};

use thiserror::Error;

use crate::values::Money;

/// Which verification code a transition checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    Pickup,
    Delivery,
}

impl std::fmt::Display for CodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeKind::Pickup => write!(f, "pickup"),
            CodeKind::Delivery => write!(f, "delivery"),
        }
    }
}

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Order has not been placed")]
    NotPlaced,

    #[error("Order has no items")]
    NoItems,

    #[error("Invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: String, quantity: u32 },

    #[error("Subtotal {submitted} does not match item prices {expected}")]
    SubtotalMismatch { submitted: Money, expected: Money },

    #[error("Order amount is too large")]
    AmountOverflow,

    #[error("Total {total} is not subtotal + delivery fee - discount")]
    InconsistentTotal { total: Money },

    #[error("Delivery contact name and phone are required")]
    MissingContact,

    #[error("Coordinates are out of range")]
    InvalidCoordinates,

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{actor} may not move this order to {target}")]
    NotPermitted { actor: Actor, target: OrderStatus },

    #[error("Invalid {kind} code")]
    InvalidCode { kind: CodeKind },
}
