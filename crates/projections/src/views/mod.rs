//! Read model views.

pub mod delivery_board;
pub mod driver_earnings;

pub use delivery_board::{AvailableDelivery, DeliveryBoardView};
pub use driver_earnings::{DriverEarnings, DriverEarningsView};
