//! Delivery zone directory trait and in-memory implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeoPoint, Money};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::SettlementError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneStatus {
    Active,
    Inactive,
}

/// A service area with its delivery fee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryZone {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub status: ZoneStatus,
    pub delivery_fee: Money,
    /// Boundary vertices in order; the ring is closed implicitly.
    pub polygon: Vec<GeoPoint>,
}

impl DeliveryZone {
    pub fn is_active(&self) -> bool {
        self.status == ZoneStatus::Active
    }

    /// Even-odd ray casting over the boundary. Points on an edge may fall
    /// either way.
    pub fn contains(&self, point: GeoPoint) -> bool {
        let vertices = &self.polygon;
        if vertices.len() < 3 {
            return false;
        }

        let mut inside = false;
        let mut j = vertices.len() - 1;
        for i in 0..vertices.len() {
            let (a, b) = (vertices[i], vertices[j]);
            if (a.lat > point.lat) != (b.lat > point.lat) {
                let crossing = (b.lng - a.lng) * (point.lat - a.lat) / (b.lat - a.lat) + a.lng;
                if point.lng < crossing {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// Trait for looking up delivery zones.
#[async_trait]
pub trait ZoneDirectory: Send + Sync {
    async fn get_zone(&self, zone_id: &str) -> Result<Option<DeliveryZone>, SettlementError>;

    /// Active zones, i.e. the area currently served.
    async fn served_zones(&self) -> Result<Vec<DeliveryZone>, SettlementError>;
}

/// Zones held in memory, usually loaded from a JSON file at startup.
#[derive(Debug, Clone, Default)]
pub struct InMemoryZoneDirectory {
    zones: Arc<RwLock<HashMap<String, DeliveryZone>>>,
}

impl InMemoryZoneDirectory {
    pub fn new(zones: impl IntoIterator<Item = DeliveryZone>) -> Self {
        let zones = zones.into_iter().map(|z| (z.id.clone(), z)).collect();
        Self {
            zones: Arc::new(RwLock::new(zones)),
        }
    }

    /// Parses a JSON array of zones.
    pub fn from_json(json: &str) -> Result<Self, SettlementError> {
        let zones: Vec<DeliveryZone> = serde_json::from_str(json)
            .map_err(|e| SettlementError::Configuration(format!("invalid zones: {e}")))?;
        Ok(Self::new(zones))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SettlementError> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            SettlementError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let directory = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), zones = directory.len().await, "zones loaded");
        Ok(directory)
    }

    pub async fn upsert(&self, zone: DeliveryZone) {
        self.zones.write().await.insert(zone.id.clone(), zone);
    }

    pub async fn len(&self) -> usize {
        self.zones.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.zones.read().await.is_empty()
    }
}

#[async_trait]
impl ZoneDirectory for InMemoryZoneDirectory {
    async fn get_zone(&self, zone_id: &str) -> Result<Option<DeliveryZone>, SettlementError> {
        Ok(self.zones.read().await.get(zone_id).cloned())
    }

    async fn served_zones(&self) -> Result<Vec<DeliveryZone>, SettlementError> {
        let mut zones: Vec<_> = self
            .zones
            .read()
            .await
            .values()
            .filter(|z| z.is_active())
            .cloned()
            .collect();
        zones.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(zones)
    }
}
