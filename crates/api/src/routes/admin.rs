//! Back-office writes to the driver and merchant directories.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{DriverId, MerchantId};
use domain::GeoPoint;
use event_store::EventStore;
use serde::{Deserialize, Serialize};
use settlement::{DriverDirectory, MerchantDirectory, MerchantProfile, SettlementError};

use crate::error::ApiError;
use crate::routes::{AppState, parse_id};

#[derive(Debug, Deserialize)]
pub struct DriverApprovalRequest {
    pub approved: bool,
}

#[derive(Debug, Serialize)]
pub struct DriverApprovalResponse {
    pub driver_id: DriverId,
    pub approved: bool,
}

#[derive(Debug, Deserialize)]
pub struct MerchantRequest {
    pub name: String,
    pub location: GeoPoint,
}

/// PUT /admin/drivers/{id}
#[tracing::instrument(skip(state, req), fields(approved = req.approved))]
pub async fn set_driver_approval<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<DriverApprovalRequest>,
) -> Result<Json<DriverApprovalResponse>, ApiError> {
    let driver_id: DriverId = parse_id("driver", &id)?;
    state
        .engine
        .collaborators()
        .drivers
        .set_approved(driver_id, req.approved)
        .await?;
    tracing::info!(%driver_id, approved = req.approved, "driver approval updated");

    Ok(Json(DriverApprovalResponse {
        driver_id,
        approved: req.approved,
    }))
}

/// PUT /admin/merchants/{id}
#[tracing::instrument(skip(state, req))]
pub async fn upsert_merchant<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<MerchantRequest>,
) -> Result<Json<MerchantProfile>, ApiError> {
    let merchant_id: MerchantId = parse_id("merchant", &id)?;
    if req.name.trim().is_empty() {
        return Err(SettlementError::validation("merchant name is required").into());
    }
    if !req.location.is_valid() {
        return Err(SettlementError::validation("merchant location is out of range").into());
    }

    let profile = MerchantProfile {
        merchant_id,
        name: req.name,
        location: req.location,
    };
    state
        .engine
        .collaborators()
        .merchants
        .upsert_merchant(profile.clone())
        .await?;
    tracing::info!(%merchant_id, "merchant profile updated");

    Ok(Json(profile))
}
