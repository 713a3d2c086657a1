//! HTTP surface of the delivery marketplace order engine.
//!
//! Exposes checkout, order transitions, the merchant catalog, wallets and
//! withdrawals, and the delivery board / driver earnings read models, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{DeliveryBoardView, DriverEarningsView, ProjectionProcessor};
use settlement::{Collaborators, EngineConfig, OrderEngine};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        // Orders
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route(
            "/orders/{id}/transitions",
            post(routes::orders::transition::<S>),
        )
        .route("/orders/{id}/events", get(routes::orders::events::<S>))
        // Read models
        .route(
            "/deliveries/available",
            get(routes::deliveries::available::<S>),
        )
        .route(
            "/drivers/{id}/earnings",
            get(routes::deliveries::driver_earnings::<S>),
        )
        // Catalog
        .route("/products", post(routes::products::register::<S>))
        .route("/products/{id}", get(routes::products::get::<S>))
        .route(
            "/products/{id}/restock",
            post(routes::products::restock::<S>),
        )
        .route("/products/{id}/price", put(routes::products::reprice::<S>))
        // Wallets
        .route("/wallets/{kind}/{id}", get(routes::wallets::get::<S>))
        .route(
            "/wallets/{kind}/{id}/withdrawals",
            post(routes::wallets::request_withdrawal::<S>),
        )
        .route(
            "/wallets/{kind}/{id}/withdrawals/{wid}/pending",
            post(routes::wallets::mark_pending::<S>),
        )
        .route(
            "/wallets/{kind}/{id}/withdrawals/{wid}/settle",
            post(routes::wallets::settle::<S>),
        )
        // Back office
        .route(
            "/admin/drivers/{id}",
            put(routes::admin::set_driver_approval::<S>),
        )
        .route(
            "/admin/merchants/{id}",
            put(routes::admin::upsert_merchant::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the engine and both read models over one event store.
pub fn create_state<S: EventStore + Clone + 'static>(
    event_store: S,
    collaborators: Collaborators,
    engine_config: EngineConfig,
) -> Arc<AppState<S>> {
    let engine = OrderEngine::new(event_store.clone(), collaborators, engine_config);

    let delivery_board = DeliveryBoardView::new();
    let driver_earnings = DriverEarningsView::new();

    let mut processor = ProjectionProcessor::new(event_store);
    processor.register(Box::new(delivery_board.clone()));
    processor.register(Box::new(driver_earnings.clone()));

    Arc::new(AppState {
        engine,
        projection_processor: Arc::new(processor),
        delivery_board,
        driver_earnings,
    })
}

/// State with empty in-memory directories, straight-line routing and
/// log-only notifications.
pub fn create_default_state<S: EventStore + Clone + 'static>(event_store: S) -> Arc<AppState<S>> {
    create_state(
        event_store,
        Collaborators::in_memory(),
        EngineConfig::default(),
    )
}
