//! Product aggregate: catalog entry and stock level.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{AggregateId, MerchantId, ProductId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};
use crate::values::Money;

use super::{
    InventoryError, MAX_UNIT_PRICE_CENTS, ProductEvent,
    events::{
        PriceChangedData, ProductRegisteredData, StockReleasedData, StockReservedData,
        StockRestockedData,
    },
};

/// Stock held for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub quantity: u32,
    pub released: bool,
}

/// A merchant's product and its available stock.
///
/// Every reservation is an event on the product stream, so two reservations
/// decided against the same stock level cannot both commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    id: Option<ProductId>,

    #[serde(default)]
    version: Version,

    merchant_id: Option<MerchantId>,
    name: String,
    unit_price: Money,
    stock_quantity: u32,
    reservations: HashMap<AggregateId, Reservation>,
    registered_at: Option<DateTime<Utc>>,
}

impl Aggregate for Product {
    type Event = ProductEvent;
    type Error = InventoryError;

    fn aggregate_type() -> &'static str {
        "Product"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id.map(AggregateId::from)
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            ProductEvent::ProductRegistered(data) => self.apply_registered(data),
            ProductEvent::StockReserved(data) => {
                self.stock_quantity = self.stock_quantity.saturating_sub(data.quantity);
                self.reservations.insert(
                    data.order_id,
                    Reservation {
                        quantity: data.quantity,
                        released: false,
                    },
                );
            }
            ProductEvent::StockReleased(data) => {
                self.stock_quantity = self.stock_quantity.saturating_add(data.quantity);
                if let Some(reservation) = self.reservations.get_mut(&data.order_id) {
                    reservation.released = true;
                }
            }
            ProductEvent::StockRestocked(data) => {
                self.stock_quantity = self.stock_quantity.saturating_add(data.quantity);
            }
            ProductEvent::PriceChanged(data) => self.unit_price = data.new_price,
        }
    }
}

impl SnapshotCapable for Product {
    fn snapshot_interval() -> usize {
        50
    }
}

// Query methods
impl Product {
    pub fn product_id(&self) -> Option<ProductId> {
        self.id
    }

    pub fn merchant_id(&self) -> Option<MerchantId> {
        self.merchant_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn stock_quantity(&self) -> u32 {
        self.stock_quantity
    }

    pub fn reservation_for(&self, order_id: AggregateId) -> Option<Reservation> {
        self.reservations.get(&order_id).copied()
    }

    /// Quantity currently held by orders that have not released it.
    pub fn reserved_quantity(&self) -> u32 {
        self.reservations
            .values()
            .filter(|r| !r.released)
            .fold(0u32, |sum, r| sum.saturating_add(r.quantity))
    }
}

// Command methods (return events)
impl Product {
    pub fn register(
        &self,
        product_id: ProductId,
        merchant_id: MerchantId,
        name: impl Into<String>,
        unit_price: Money,
        initial_stock: u32,
    ) -> Result<Vec<ProductEvent>, InventoryError> {
        if self.id.is_some() {
            return Err(InventoryError::AlreadyRegistered { product_id });
        }
        let name = name.into();
        if name.trim().is_empty() {
            return Err(InventoryError::MissingName);
        }
        if !is_valid_price(unit_price) {
            return Err(InventoryError::InvalidPrice { price: unit_price });
        }

        Ok(vec![ProductEvent::ProductRegistered(ProductRegisteredData {
            product_id,
            merchant_id,
            name,
            unit_price,
            initial_stock,
            registered_at: Utc::now(),
        })])
    }

    /// Takes `quantity` units out of stock for `order_id`.
    pub fn reserve(
        &self,
        order_id: AggregateId,
        quantity: u32,
    ) -> Result<Vec<ProductEvent>, InventoryError> {
        let product_id = self.require_registered()?;
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity { quantity });
        }
        if self.reservations.contains_key(&order_id) {
            return Err(InventoryError::AlreadyReserved {
                product_id,
                order_id,
            });
        }
        if quantity > self.stock_quantity {
            return Err(InventoryError::InsufficientStock {
                product_id,
                requested: quantity,
                available: self.stock_quantity,
            });
        }

        Ok(vec![ProductEvent::StockReserved(StockReservedData {
            order_id,
            quantity,
            remaining: self.stock_quantity - quantity,
        })])
    }

    /// Returns the stock held for `order_id`. No-op if nothing is held.
    pub fn release(&self, order_id: AggregateId) -> Result<Vec<ProductEvent>, InventoryError> {
        self.require_registered()?;
        match self.reservations.get(&order_id) {
            Some(reservation) if !reservation.released => {
                Ok(vec![ProductEvent::StockReleased(StockReleasedData {
                    order_id,
                    quantity: reservation.quantity,
                })])
            }
            _ => Ok(vec![]),
        }
    }

    pub fn restock(&self, quantity: u32) -> Result<Vec<ProductEvent>, InventoryError> {
        let product_id = self.require_registered()?;
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity { quantity });
        }
        if self.stock_quantity.checked_add(quantity).is_none() {
            return Err(InventoryError::StockOverflow {
                product_id,
                current: self.stock_quantity,
                added: quantity,
            });
        }
        Ok(vec![ProductEvent::StockRestocked(StockRestockedData {
            quantity,
        })])
    }

    /// Changes the live price. Orders already placed keep their price.
    pub fn reprice(&self, new_price: Money) -> Result<Vec<ProductEvent>, InventoryError> {
        self.require_registered()?;
        if !is_valid_price(new_price) {
            return Err(InventoryError::InvalidPrice { price: new_price });
        }
        if new_price == self.unit_price {
            return Ok(vec![]);
        }
        Ok(vec![ProductEvent::PriceChanged(PriceChangedData {
            old_price: self.unit_price,
            new_price,
        })])
    }

    fn require_registered(&self) -> Result<ProductId, InventoryError> {
        self.id.ok_or(InventoryError::NotRegistered)
    }
}

fn is_valid_price(price: Money) -> bool {
    price.is_positive() && price.cents() <= MAX_UNIT_PRICE_CENTS
}

// Apply event helpers
impl Product {
    fn apply_registered(&mut self, data: ProductRegisteredData) {
        self.id = Some(data.product_id);
        self.merchant_id = Some(data.merchant_id);
        self.name = data.name;
        self.unit_price = data.unit_price;
        self.stock_quantity = data.initial_stock;
        self.registered_at = Some(data.registered_at);
    }
}
