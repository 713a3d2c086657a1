//! Identifier types shared across the workspace.

mod types;

pub use types::{AggregateId, DriverId, MerchantId, ProductId, UserId};
