//! Order checkout, transition and history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{AggregateId, DriverId, MerchantId, UserId};
use domain::{
    Aggregate, DeliveryInfo, GeoPoint, LineItem, Money, Order, OrderPrices, OrderStatus, Payment,
    StatusEntry, Transaction,
};
use event_store::EventStore;
use serde::Serialize;
use settlement::{CreateOrderRequest, TransitionRequest};

use crate::error::ApiError;
use crate::routes::{AppState, parse_id};

// -- Response types --

/// An order as returned to callers. Verification codes are left out; they
/// are only handed back once, at checkout.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: AggregateId,
    pub status: OrderStatus,
    pub user_id: Option<UserId>,
    pub merchant_id: Option<MerchantId>,
    pub driver_id: Option<DriverId>,
    pub zone_id: String,
    pub items: Vec<LineItem>,
    pub prices: Option<OrderPrices>,
    pub delivery_info: Option<DeliveryInfo>,
    pub pickup_location: Option<GeoPoint>,
    pub payment: Option<Payment>,
    pub status_history: Vec<StatusEntry>,
    pub driver_total_distance_km: f64,
    pub driver_total_duration_secs: i64,
    pub last_known_location: Option<GeoPoint>,
    pub on_time_delivery: Option<bool>,
    pub driver_earnings: Option<Money>,
    pub placed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OrderResponse {
    fn from_order(order: &Order) -> Result<Self, ApiError> {
        let id = order
            .id()
            .ok_or_else(|| ApiError::Internal("order without an id".to_string()))?;
        Ok(Self {
            id,
            status: order.status(),
            user_id: order.user_id(),
            merchant_id: order.merchant_id(),
            driver_id: order.driver_id(),
            zone_id: order.zone_id().to_string(),
            items: order.items().to_vec(),
            prices: order.prices().copied(),
            delivery_info: order.delivery_info().cloned(),
            pickup_location: order.pickup_location(),
            payment: order.payment().copied(),
            status_history: order.status_history().to_vec(),
            driver_total_distance_km: order.driver_total_distance_km(),
            driver_total_duration_secs: order.driver_total_duration_secs(),
            last_known_location: order.last_known_location(),
            on_time_delivery: order.on_time_delivery(),
            driver_earnings: order.recorded_driver_earnings(),
            placed_at: order.placed_at(),
            delivered_at: order.delivered_at(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct OrderCreatedResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub pickup_code: Option<String>,
    pub delivery_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub order: OrderResponse,
    /// The driver's earnings credit, present only when the order completed.
    pub earnings: Option<Transaction>,
}

#[derive(Debug, Serialize)]
pub struct OrderEventResponse {
    pub event_id: String,
    pub event_type: String,
    pub version: i64,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

// -- Handlers --

/// POST /orders: checkout.
#[tracing::instrument(skip(state, req), fields(zone_id = %req.zone_id))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>), ApiError> {
    let order = state.engine.create_order(req).await?;

    let response = OrderCreatedResponse {
        order: OrderResponse::from_order(&order)?,
        pickup_code: order.pickup_code().map(|c| c.as_str().to_string()),
        delivery_code: order.delivery_code().map(|c| c.as_str().to_string()),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: AggregateId = parse_id("order", &id)?;
    let order = state.engine.get_order(order_id).await?;
    Ok(Json(OrderResponse::from_order(&order)?))
}

/// POST /orders/{id}/transitions
#[tracing::instrument(skip(state, req), fields(target = %req.target, actor = %req.actor))]
pub async fn transition<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let order_id: AggregateId = parse_id("order", &id)?;
    let outcome = state.engine.transition_order(order_id, req).await?;

    Ok(Json(TransitionResponse {
        order: OrderResponse::from_order(&outcome.order)?,
        earnings: outcome.earnings,
    }))
}

/// GET /orders/{id}/events: the raw event stream of an order.
#[tracing::instrument(skip(state))]
pub async fn events<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderEventResponse>>, ApiError> {
    let order_id: AggregateId = parse_id("order", &id)?;
    let history = state.engine.order_history(order_id).await?;

    let events = history
        .into_iter()
        .map(|e| OrderEventResponse {
            event_id: e.event_id.to_string(),
            event_type: e.event_type,
            version: e.version.as_i64(),
            timestamp: e.timestamp,
            payload: e.payload,
        })
        .collect();

    Ok(Json(events))
}
