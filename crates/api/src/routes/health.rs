//! Liveness endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use event_store::EventStore;
use serde::Serialize;
use settlement::ZoneDirectory;

use crate::routes::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Active delivery zones; zero means checkout will refuse every order.
    pub served_zones: usize,
    pub projections: usize,
}

/// GET /health
pub async fn check<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<HealthResponse> {
    let served_zones = match state.engine.collaborators().zones.served_zones().await {
        Ok(zones) => zones.len(),
        Err(err) => {
            tracing::warn!(error = %err, "zone directory unavailable");
            0
        }
    };

    Json(HealthResponse {
        status: "ok",
        served_zones,
        projections: state.projection_processor.projection_count(),
    })
}
