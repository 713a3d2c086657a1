//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use event_store::{EventStore, InMemoryEventStore, PostgresEventStore};
use metrics_exporter_prometheus::PrometheusHandle;
use settlement::{
    Collaborators, InMemoryDriverDirectory, InMemoryMerchantDirectory, InMemoryZoneDirectory,
    LoggingNotifier, ResilientRouter, StraightLineRouter,
};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn collaborators(config: &Config) -> Collaborators {
    let zones = match &config.zones_file {
        Some(path) => InMemoryZoneDirectory::from_file(path)
            .await
            .expect("failed to load delivery zones"),
        None => {
            tracing::warn!("ZONES_FILE not set, no delivery zone is served");
            InMemoryZoneDirectory::default()
        }
    };

    let router = ResilientRouter::new(
        Arc::new(StraightLineRouter::new(config.average_speed_kmh)),
        config.routing_timeout,
        config.average_speed_kmh,
    );

    Collaborators::new(
        Arc::new(zones),
        Arc::new(InMemoryDriverDirectory::new()),
        Arc::new(InMemoryMerchantDirectory::new()),
        router,
        Arc::new(LoggingNotifier),
    )
}

async fn serve<S: EventStore + Clone + 'static>(
    event_store: S,
    config: Config,
    metrics_handle: PrometheusHandle,
) {
    let state = api::create_state(
        event_store,
        collaborators(&config).await,
        config.engine_config(),
    );

    // Replay whatever is already stored into the read models.
    let delivered = state
        .projection_processor
        .run_catch_up()
        .await
        .expect("catch-up failed");
    tracing::info!(delivered, "read models caught up");

    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Configuration and tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the event store and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresEventStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL event store");
            serve(store, config, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, keeping events in memory");
            serve(InMemoryEventStore::new(), config, metrics_handle).await;
        }
    }
}
