//! Driver earnings read model: per-driver delivery totals.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, DriverId};
use domain::{Actor, Money, OrderEvent, OrderStatus};
use event_store::EventEnvelope;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;
use crate::projection::{Projection, ProjectionPosition};
use crate::read_model::ReadModel;

/// Aggregated delivery statistics of one driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverEarnings {
    pub driver_id: DriverId,
    pub completed_deliveries: u64,
    /// Orders the driver picked up and then rejected or cancelled.
    pub abandoned_deliveries: u64,
    pub total_earnings: Money,
    pub total_distance_km: f64,
    pub total_duration_secs: i64,
    pub on_time_deliveries: u64,
    pub late_deliveries: u64,
    /// Orders picked up and not yet finished.
    pub active_orders: Vec<AggregateId>,
    pub last_delivery_at: Option<DateTime<Utc>>,
}

impl DriverEarnings {
    fn new(driver_id: DriverId) -> Self {
        Self {
            driver_id,
            completed_deliveries: 0,
            abandoned_deliveries: 0,
            total_earnings: Money::zero(),
            total_distance_km: 0.0,
            total_duration_secs: 0,
            on_time_deliveries: 0,
            late_deliveries: 0,
            active_orders: Vec::new(),
            last_delivery_at: None,
        }
    }

    /// Share of deliveries with an estimate that arrived on time.
    pub fn on_time_rate(&self) -> Option<f64> {
        let rated = self.on_time_deliveries + self.late_deliveries;
        (rated > 0).then(|| self.on_time_deliveries as f64 / rated as f64)
    }

    pub fn average_earnings(&self) -> Money {
        if self.completed_deliveries == 0 {
            return Money::zero();
        }
        Money::from_cents(self.total_earnings.cents() / self.completed_deliveries as i64)
    }
}

struct EarningsState {
    drivers: HashMap<DriverId, DriverEarnings>,
    /// Driver currently carrying each order.
    carriers: HashMap<AggregateId, DriverId>,
    position: ProjectionPosition,
}

impl EarningsState {
    fn driver(&mut self, driver_id: DriverId) -> &mut DriverEarnings {
        self.drivers
            .entry(driver_id)
            .or_insert_with(|| DriverEarnings::new(driver_id))
    }

    fn carrier(&mut self, order_id: AggregateId) -> Option<&mut DriverEarnings> {
        let driver_id = *self.carriers.get(&order_id)?;
        Some(self.driver(driver_id))
    }

    fn finish(&mut self, order_id: AggregateId) -> Option<&mut DriverEarnings> {
        let driver_id = self.carriers.remove(&order_id)?;
        let driver = self.driver(driver_id);
        driver.active_orders.retain(|id| *id != order_id);
        Some(driver)
    }
}

/// Earnings, distance and punctuality per driver, derived from order events.
#[derive(Clone)]
pub struct DriverEarningsView {
    state: Arc<RwLock<EarningsState>>,
}

impl DriverEarningsView {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(EarningsState {
                drivers: HashMap::new(),
                carriers: HashMap::new(),
                position: ProjectionPosition::zero(),
            })),
        }
    }

    pub async fn get_driver(&self, driver_id: DriverId) -> Option<DriverEarnings> {
        self.state.read().await.drivers.get(&driver_id).cloned()
    }

    /// Drivers by total earnings, highest first.
    pub async fn leaderboard(&self, limit: usize) -> Vec<DriverEarnings> {
        let mut drivers: Vec<_> = self.state.read().await.drivers.values().cloned().collect();
        drivers.sort_by(|a, b| b.total_earnings.cmp(&a.total_earnings));
        drivers.truncate(limit);
        drivers
    }
}

impl Default for DriverEarningsView {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Projection for DriverEarningsView {
    fn name(&self) -> &'static str {
        "DriverEarningsView"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let mut state = self.state.write().await;

        if event.aggregate_type == "Order" {
            let order_id = event.aggregate_id;
            match serde_json::from_value::<OrderEvent>(event.payload.clone())? {
                OrderEvent::DriverAssigned(data) => {
                    state.carriers.insert(order_id, data.driver_id);
                    state.driver(data.driver_id).active_orders.push(order_id);
                }
                OrderEvent::LegTravelled(data) => {
                    if let Some(driver) = state.carrier(order_id) {
                        driver.total_distance_km += data.leg.distance_km;
                        driver.total_duration_secs += data.leg.duration_secs;
                    }
                }
                OrderEvent::OrderDelivered(data) => {
                    let driver = state.driver(data.driver_id);
                    driver.completed_deliveries += 1;
                    driver.total_earnings += data.driver_earnings;
                    driver.last_delivery_at = Some(data.delivered_at);
                    match data.on_time {
                        Some(true) => driver.on_time_deliveries += 1,
                        Some(false) => driver.late_deliveries += 1,
                        None => {}
                    }
                }
                OrderEvent::StatusChanged(data) => match (data.to, data.actor) {
                    (OrderStatus::Completed, _) => {
                        state.finish(order_id);
                    }
                    (
                        OrderStatus::RejectedByDriver | OrderStatus::CanceledByDriver,
                        Actor::Driver(_),
                    ) => {
                        if let Some(driver) = state.finish(order_id) {
                            driver.abandoned_deliveries += 1;
                        }
                    }
                    _ => {}
                },
                OrderEvent::OrderPlaced(_) | OrderEvent::PaymentCompleted(_) => {}
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
        state.drivers.clear();
        state.carriers.clear();
        state.position = ProjectionPosition::zero();
        Ok(())
    }
}

impl ReadModel for DriverEarningsView {
    fn name(&self) -> &'static str {
        "DriverEarningsView"
    }

    fn count(&self) -> usize {
        self.state.try_read().map(|s| s.drivers.len()).unwrap_or(0)
    }
}
