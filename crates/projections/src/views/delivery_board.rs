//! Delivery board read model: orders ready and waiting for a driver.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, MerchantId};
use domain::{DRIVER_EARNINGS_PERCENT, GeoPoint, Money, OrderEvent, OrderStatus};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// An order a driver can pick up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableDelivery {
    pub order_id: AggregateId,
    pub merchant_id: MerchantId,
    pub zone_id: String,
    pub pickup_location: GeoPoint,
    pub destination: GeoPoint,
    pub item_count: u32,
    pub delivery_fee: Money,
    /// What the driver will be credited on completion.
    pub driver_earnings: Money,
    pub placed_at: DateTime<Utc>,
    pub estimated_delivery_at: Option<DateTime<Utc>>,
    /// `None` while the merchant is still working on the order.
    pub ready_at: Option<DateTime<Utc>>,
}

struct BoardState {
    /// Orders not yet picked up and not terminal.
    open: HashMap<AggregateId, AvailableDelivery>,
    position: ProjectionPosition,
}

/// Orders in `READY_TO_DELIVER`, oldest first.
///
/// Orders enter the board when the merchant marks them ready and leave it as
/// soon as a driver accepts them or the merchant cancels.
#[derive(Clone)]
pub struct DeliveryBoardView {
    state: Arc<RwLock<BoardState>>,
}

impl DeliveryBoardView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(BoardState {
                open: HashMap::new(),
                position: ProjectionPosition::zero(),
            })),
        }
    }

    pub async fn get(&self, order_id: AggregateId) -> Option<AvailableDelivery> {
        self.state
            .read()
            .await
            .open
            .get(&order_id)
            .filter(|d| d.ready_at.is_some())
            .cloned()
    }

    pub async fn available(&self) -> Vec<AvailableDelivery> {
        self.collect(|_| true).await
    }

    pub async fn available_in_zone(&self, zone_id: &str) -> Vec<AvailableDelivery> {
        self.collect(|d| d.zone_id == zone_id).await
    }

    /// Ready orders whose pickup lies within `radius_km` of `location`,
    /// nearest first.
    pub async fn available_near(&self, location: GeoPoint, radius_km: f64) -> Vec<AvailableDelivery> {
        let mut nearby: Vec<(f64, AvailableDelivery)> = self
            .collect(|_| true)
            .await
            .into_iter()
            .map(|d| (location.distance_km(&d.pickup_location), d))
            .filter(|(km, _)| *km <= radius_km)
            .collect();
        nearby.sort_by(|a, b| a.0.total_cmp(&b.0));
        nearby.into_iter().map(|(_, d)| d).collect()
    }

    async fn collect(&self, keep: impl Fn(&AvailableDelivery) -> bool) -> Vec<AvailableDelivery> {
        let state = self.state.read().await;
        let mut ready: Vec<_> = state
            .open
            .values()
            .filter(|d| d.ready_at.is_some() && keep(d))
            .cloned()
            .collect();
        ready.sort_by_key(|d| d.ready_at);
        ready
    }
}

impl Default for DeliveryBoardView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for DeliveryBoardView {
    fn name(&self) -> &'static str {
        "DeliveryBoardView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        if event.aggregate_type == "Order" {
            let order_id = event.aggregate_id;
            match serde_json::from_value::<OrderEvent>(event.payload.clone())? {
                OrderEvent::OrderPlaced(data) => {
                    state.open.insert(
                        order_id,
                        AvailableDelivery {
                            order_id,
                            merchant_id: data.merchant_id,
                            zone_id: data.zone_id,
                            pickup_location: data.pickup_location,
                            destination: data.delivery_info.destination,
                            item_count: data.items.iter().map(|i| i.quantity).sum(),
                            delivery_fee: data.prices.delivery_fee,
                            driver_earnings: data
                                .prices
                                .delivery_fee
                                .ratio(DRIVER_EARNINGS_PERCENT, 100),
                            placed_at: data.placed_at,
                            estimated_delivery_at: data.delivery_info.estimated_delivery_at,
                            ready_at: None,
                        },
                    );
                }
                OrderEvent::StatusChanged(data) => match data.to {
                    OrderStatus::ReadyToDeliver => {
                        if let Some(delivery) = state.open.get_mut(&order_id) {
                            delivery.ready_at = Some(data.changed_at);
                        }
                    }
                    OrderStatus::AcceptedByMerchant | OrderStatus::InPreparation => {}
                    _ => {
                        state.open.remove(&order_id);
                    }
                },
                OrderEvent::DriverAssigned(_)
                | OrderEvent::LegTravelled(_)
                | OrderEvent::PaymentCompleted(_)
                | OrderEvent::OrderDelivered(_) => {}
            }
        }

        state.position = state.position.advance();
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.open.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for DeliveryBoardView {
    fn name(&self) -> &'static str {
        "DeliveryBoardView"
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|s| s.open.values().filter(|d| d.ready_at.is_some()).count())
            .unwrap_or(0)
    }
}
