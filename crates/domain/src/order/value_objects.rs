//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::{DriverId, MerchantId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::values::{GeoPoint, Money};

use super::OrderStatus;

const CODE_LEN: usize = 6;

/// Short code a driver or customer reads out to prove presence.
///
/// Generated codes are six upper-case hex characters. Comparison ignores case
/// and surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationCode(String);

impl VerificationCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_string())
    }

    pub fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(hex[..CODE_LEN].to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, candidate: &str) -> bool {
        !self.0.is_empty() && self.0.eq_ignore_ascii_case(candidate.trim())
    }
}

impl std::fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Price breakdown fixed at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPrices {
    pub subtotal: Money,
    pub delivery_fee: Money,
    #[serde(default)]
    pub discount: Money,
    pub total: Money,
}

impl OrderPrices {
    /// Computes the total from its parts.
    pub fn new(subtotal: Money, delivery_fee: Money, discount: Money) -> Self {
        Self {
            subtotal,
            delivery_fee,
            discount,
            total: subtotal + delivery_fee - discount,
        }
    }

    /// `total == subtotal + delivery_fee - discount` with no negative parts
    /// and a discount no larger than what it discounts.
    pub fn is_consistent(&self) -> bool {
        if self.subtotal.is_negative()
            || self.delivery_fee.is_negative()
            || self.discount.is_negative()
        {
            return false;
        }
        match self.subtotal.checked_add(self.delivery_fee) {
            Some(gross) => {
                self.discount <= gross && gross.checked_sub(self.discount) == Some(self.total)
            }
            None => false,
        }
    }
}

/// One product line, priced at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub price_at_order_time: Money,
}

impl LineItem {
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        price_at_order_time: Money,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            quantity,
            price_at_order_time,
        }
    }

    /// `None` if the line is too large to price.
    pub fn line_total(&self) -> Option<Money> {
        self.price_at_order_time.checked_multiply(self.quantity)
    }
}

/// Merges lines for the same product, keeping first-seen order.
pub fn merge_line_items(items: Vec<LineItem>) -> Vec<LineItem> {
    let mut merged: Vec<LineItem> = Vec::with_capacity(items.len());
    for item in items {
        match merged.iter_mut().find(|m| m.product_id == item.product_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(item.quantity),
            None => merged.push(item),
        }
    }
    merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationSource {
    Gps,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: String,
}

impl Contact {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.phone.trim().is_empty()
    }
}

/// Where and to whom the order is delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub destination: GeoPoint,
    pub location_source: LocationSource,
    pub contact: Contact,
    #[serde(default)]
    pub notes: Option<String>,
    /// Human-readable address resolved from the coordinates, if any.
    #[serde(default)]
    pub resolved_address: Option<String>,
    #[serde(default)]
    pub estimated_delivery_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
    Wallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    #[serde(default)]
    pub status: PaymentStatus,
}

/// A travelled leg as reported by routing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    pub distance_km: f64,
    pub duration_secs: i64,
    /// True when the leg was estimated because routing was unavailable.
    #[serde(default)]
    pub degraded: bool,
}

impl RouteLeg {
    /// Negative or non-finite measurements are clamped to zero.
    pub fn new(distance_km: f64, duration_secs: i64, degraded: bool) -> Self {
        let distance_km = if distance_km.is_finite() {
            distance_km.max(0.0)
        } else {
            0.0
        };
        Self {
            distance_km,
            duration_secs: duration_secs.max(0),
            degraded,
        }
    }
}

/// Whoever asks for a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Customer(UserId),
    Merchant(MerchantId),
    Driver(DriverId),
    Admin,
    System,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Customer(id) => write!(f, "customer:{id}"),
            Actor::Merchant(id) => write!(f, "merchant:{id}"),
            Actor::Driver(id) => write!(f, "driver:{id}"),
            Actor::Admin => write!(f, "admin"),
            Actor::System => write!(f, "system"),
        }
    }
}

/// One entry of the append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}
