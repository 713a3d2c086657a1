//! Read-model endpoints: the delivery board and driver earnings.
//!
//! Both views are brought up to date before answering.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::DriverId;
use domain::{GeoPoint, Money};
use event_store::EventStore;
use projections::{AvailableDelivery, DriverEarnings};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::{AppState, parse_id};

const DEFAULT_RADIUS_KM: f64 = 5.0;

#[derive(Debug, Default, Deserialize)]
pub struct BoardQuery {
    pub zone_id: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
}

impl BoardQuery {
    fn near(&self) -> Result<Option<(GeoPoint, f64)>, ApiError> {
        match (self.lat, self.lng) {
            (None, None) => Ok(None),
            (Some(lat), Some(lng)) => {
                let point = GeoPoint::new(lat, lng);
                if !point.is_valid() {
                    return Err(ApiError::BadRequest(format!(
                        "Invalid coordinates ({lat}, {lng})"
                    )));
                }
                let radius = self.radius_km.unwrap_or(DEFAULT_RADIUS_KM);
                if !radius.is_finite() || radius <= 0.0 {
                    return Err(ApiError::BadRequest(format!("Invalid radius {radius}")));
                }
                Ok(Some((point, radius)))
            }
            _ => Err(ApiError::BadRequest(
                "lat and lng must be given together".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EarningsResponse {
    #[serde(flatten)]
    pub stats: DriverEarnings,
    pub on_time_rate: Option<f64>,
    pub average_earnings: Money,
}

/// GET /deliveries/available: ready orders waiting for a driver, oldest
/// first. Filter by `zone_id`, or by `lat`/`lng` within `radius_km` of the
/// pickup.
#[tracing::instrument(skip(state))]
pub async fn available<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<Vec<AvailableDelivery>>, ApiError> {
    let near = query.near()?;
    state.refresh_views().await?;

    let board = &state.delivery_board;
    let deliveries = match (near, query.zone_id.as_deref()) {
        (Some((point, radius)), zone_id) => {
            let mut nearby = board.available_near(point, radius).await;
            if let Some(zone_id) = zone_id {
                nearby.retain(|d| d.zone_id == zone_id);
            }
            nearby
        }
        (None, Some(zone_id)) => board.available_in_zone(zone_id).await,
        (None, None) => board.available().await,
    };
    Ok(Json(deliveries))
}

/// GET /drivers/{id}/earnings
#[tracing::instrument(skip(state))]
pub async fn driver_earnings<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<EarningsResponse>, ApiError> {
    let driver_id: DriverId = parse_id("driver", &id)?;
    state.refresh_views().await?;

    let stats = state
        .driver_earnings
        .get_driver(driver_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No deliveries recorded for driver {id}")))?;

    Ok(Json(EarningsResponse {
        on_time_rate: stats.on_time_rate(),
        average_earnings: stats.average_earnings(),
        stats,
    }))
}
