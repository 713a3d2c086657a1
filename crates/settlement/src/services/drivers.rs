//! Driver approval directory.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::DriverId;
use tokio::sync::RwLock;

use crate::error::SettlementError;

/// Trait for checking whether a driver may take deliveries.
#[async_trait]
pub trait DriverDirectory: Send + Sync {
    async fn is_approved(&self, driver_id: DriverId) -> Result<bool, SettlementError>;

    async fn set_approved(&self, driver_id: DriverId, approved: bool)
    -> Result<(), SettlementError>;
}

/// In-memory driver directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDriverDirectory {
    approved: Arc<RwLock<HashSet<DriverId>>>,
}

impl InMemoryDriverDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_approved(drivers: impl IntoIterator<Item = DriverId>) -> Self {
        Self {
            approved: Arc::new(RwLock::new(drivers.into_iter().collect())),
        }
    }
}

#[async_trait]
impl DriverDirectory for InMemoryDriverDirectory {
    async fn is_approved(&self, driver_id: DriverId) -> Result<bool, SettlementError> {
        Ok(self.approved.read().await.contains(&driver_id))
    }

    async fn set_approved(
        &self,
        driver_id: DriverId,
        approved: bool,
    ) -> Result<(), SettlementError> {
        let mut drivers = self.approved.write().await;
        if approved {
            drivers.insert(driver_id);
        } else {
            drivers.remove(&driver_id);
        }
        tracing::info!(%driver_id, approved, "driver approval changed");
        Ok(())
    }
}
