//! External collaborator traits and in-memory implementations.

pub mod drivers;
pub mod merchants;
pub mod notifier;
pub mod routing;
pub mod zones;

use std::sync::Arc;

pub use drivers::{DriverDirectory, InMemoryDriverDirectory};
pub use merchants::{InMemoryMerchantDirectory, MerchantDirectory, MerchantProfile};
pub use notifier::{InMemoryNotifier, LoggingNotifier, MerchantNotification, Notifier};
pub use routing::{
    DEFAULT_AVERAGE_SPEED_KMH, DEFAULT_ROUTING_TIMEOUT, ResilientRouter, RouteResolver,
    StraightLineRouter,
};
pub use zones::{DeliveryZone, InMemoryZoneDirectory, ZoneDirectory, ZoneStatus};

/// Everything the engine consults outside the event store.
#[derive(Clone)]
pub struct Collaborators {
    pub zones: Arc<dyn ZoneDirectory>,
    pub drivers: Arc<dyn DriverDirectory>,
    pub merchants: Arc<dyn MerchantDirectory>,
    pub router: ResilientRouter,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    pub fn new(
        zones: Arc<dyn ZoneDirectory>,
        drivers: Arc<dyn DriverDirectory>,
        merchants: Arc<dyn MerchantDirectory>,
        router: ResilientRouter,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            zones,
            drivers,
            merchants,
            router,
            notifier,
        }
    }

    /// Empty in-memory directories, straight-line routing and log-only
    /// notifications.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryZoneDirectory::default()),
            Arc::new(InMemoryDriverDirectory::new()),
            Arc::new(InMemoryMerchantDirectory::new()),
            ResilientRouter::default(),
            Arc::new(LoggingNotifier),
        )
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
