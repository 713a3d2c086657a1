//! Read side of the order engine.
//!
//! Projections fold the stored order events into query-friendly views:
//! - [`DeliveryBoardView`]: orders ready and waiting for a driver
//! - [`DriverEarningsView`]: per-driver earnings, distance and punctuality
//!
//! The [`ProjectionProcessor`] catches views up from the event store.

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

#[cfg(test)]
pub(crate) mod fixtures;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use views::{AvailableDelivery, DeliveryBoardView, DriverEarnings, DriverEarningsView};
