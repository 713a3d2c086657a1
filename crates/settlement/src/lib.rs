//! Order lifecycle and driver-earnings settlement.
//!
//! The [`OrderEngine`] turns checkouts into orders and moves orders through
//! their delivery lifecycle:
//! 1. Checkout validates the zone, fee, location, merchant and prices, then
//!    commits the order together with its stock reservations
//! 2. Merchants accept, prepare and hand over the order, or reject/cancel it
//!    and get the stock back in the same commit
//! 3. An approved driver picks it up with the pickup code and completes it
//!    with the delivery code; completion credits the driver's wallet exactly
//!    once in the same commit
//!
//! Directories, routing and notifications are collaborators behind traits in
//! [`services`].

pub mod engine;
pub mod error;
pub mod request;
pub mod services;

pub use engine::{DEFAULT_CURRENCY, EngineConfig, OrderEngine};
pub use error::{ErrorKind, Result, SettlementError};
pub use request::{CheckoutItem, CreateOrderRequest, TransitionOutcome, TransitionRequest};
pub use services::{
    Collaborators, DEFAULT_AVERAGE_SPEED_KMH, DEFAULT_ROUTING_TIMEOUT, DeliveryZone,
    DriverDirectory, InMemoryDriverDirectory, InMemoryMerchantDirectory, InMemoryNotifier,
    InMemoryZoneDirectory, LoggingNotifier, MerchantDirectory, MerchantNotification,
    MerchantProfile, Notifier, ResilientRouter, RouteResolver, StraightLineRouter, ZoneDirectory,
    ZoneStatus,
};
