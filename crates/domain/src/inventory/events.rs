//! Inventory domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, MerchantId, ProductId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::values::Money;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProductEvent {
    ProductRegistered(ProductRegisteredData),
    StockReserved(StockReservedData),
    StockReleased(StockReleasedData),
    StockRestocked(StockRestockedData),
    PriceChanged(PriceChangedData),
}

impl DomainEvent for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductRegistered(_) => "ProductRegistered",
            ProductEvent::StockReserved(_) => "StockReserved",
            ProductEvent::StockReleased(_) => "StockReleased",
            ProductEvent::StockRestocked(_) => "StockRestocked",
            ProductEvent::PriceChanged(_) => "PriceChanged",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRegisteredData {
    pub product_id: ProductId,
    pub merchant_id: MerchantId,
    pub name: String,
    pub unit_price: Money,
    pub initial_stock: u32,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReservedData {
    pub order_id: AggregateId,
    pub quantity: u32,
    /// Stock left after the reservation.
    pub remaining: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReleasedData {
    pub order_id: AggregateId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRestockedData {
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChangedData {
    pub old_price: Money,
    pub new_price: Money,
}
