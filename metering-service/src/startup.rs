//! Application startup and lifecycle management.

use crate::config::MeteringConfig;
use crate::handlers;
use crate::services::Database;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use service_core::error::AppError;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: MeteringConfig,
    pub db: Arc<Database>,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: MeteringConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: MeteringConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: MeteringConfig, run_migrations: bool) -> Result<Self, AppError> {
        // Initialize metrics
        crate::services::init_metrics();

        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let state = AppState {
            config: config.clone(),
            db: Arc::new(db),
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Metering service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/health", get(handlers::health_check))
            .route("/ready", get(handlers::readiness_check))
            .route("/metrics", get(handlers::metrics_handler))
            // Usage limits
            .route(
                "/orgs/:org_id/usage/:kind",
                post(handlers::usage::consume_slot),
            )
            // Storage metering
            .route("/orgs/:org_id/storage", get(handlers::storage::check_access))
            .route(
                "/orgs/:org_id/storage/bytes",
                post(handlers::storage::record_bytes),
            )
            .route(
                "/orgs/:org_id/storage/charge",
                post(handlers::storage::charge_hourly),
            )
            // Wallets
            .route("/wallets/:owner_id", get(handlers::wallet::get_wallet))
            .route(
                "/wallets/:owner_id/bid-charges",
                post(handlers::wallet::charge_bid),
            )
            .route("/wallets/:owner_id/credits", post(handlers::wallet::credit))
            .route(
                "/wallets/:owner_id/transactions",
                get(handlers::wallet::list_transactions),
            )
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                }),
            )
            .with_state(self.state);

        tracing::info!(
            service = "metering-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}
