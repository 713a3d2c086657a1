//! Product catalog and stock reservations.

mod aggregate;
mod events;
mod service;

pub use aggregate::{Product, Reservation};
pub use events::{
    PriceChangedData, ProductEvent, ProductRegisteredData, StockReleasedData, StockReservedData,
    StockRestockedData,
};
pub use service::InventoryService;

use common::{AggregateId, ProductId};
use thiserror::Error;

use crate::values::Money;

/// Highest unit price a product may carry: 1,000,000.00.
pub const MAX_UNIT_PRICE_CENTS: i64 = 100_000_000;

/// Errors that can occur during inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Product {product_id} is already registered")]
    AlreadyRegistered { product_id: ProductId },

    #[error("Product is not registered")]
    NotRegistered,

    #[error("Product name is required")]
    MissingName,

    #[error("Invalid price: {price} (must be greater than 0 and at most 1000000.00)")]
    InvalidPrice { price: Money },

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Cannot add {added} units to {product_id}: stock of {current} would overflow")]
    StockOverflow {
        product_id: ProductId,
        current: u32,
        added: u32,
    },

    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Stock of {product_id} is already reserved for order {order_id}")]
    AlreadyReserved {
        product_id: ProductId,
        order_id: AggregateId,
    },
}
