//! Application startup and lifecycle management.

use crate::config::QuotingConfig;
use crate::handlers::{
    health_check, metrics_handler, quotes, readiness_check, templates,
};
use crate::services::{init_metrics, Database};
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: QuotingConfig,
    pub db: Arc<Database>,
}

/// HTTP routes with the shared middleware stack.
pub fn router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.common.request_timeout_secs);

    let api = Router::new()
        .route(
            "/quotes",
            get(quotes::list_quotes).post(quotes::create_quote),
        )
        .route(
            "/quotes/:quote_id",
            get(quotes::get_quote).patch(quotes::update_quote),
        )
        .route("/quotes/:quote_id/status", patch(quotes::update_quote_status))
        .route("/quotes/:quote_id/duplicate", post(quotes::duplicate_quote))
        .route("/quotes/:quote_id/items", post(quotes::add_item))
        .route(
            "/quotes/:quote_id/items/:item_id",
            patch(quotes::update_item).delete(quotes::delete_item),
        )
        .route(
            "/quotes/:quote_id/items/:item_id/parts",
            post(quotes::add_part),
        )
        .route(
            "/quotes/:quote_id/items/:item_id/parts/:part_id",
            patch(quotes::update_part).delete(quotes::delete_part),
        )
        .route(
            "/quotes/:quote_id/items/:item_id/finishing",
            post(quotes::add_finishing),
        )
        .route(
            "/quotes/:quote_id/items/:item_id/finishing/:finishing_id",
            patch(quotes::update_finishing).delete(quotes::delete_finishing),
        )
        .route("/quotes/:quote_id/recalculate", post(quotes::recalculate_quote))
        .route(
            "/templates/:template_id/price",
            post(templates::price_template),
        );

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: QuotingConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: QuotingConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: QuotingConfig, run_migrations: bool) -> Result<Self, AppError> {
        // Initialize metrics
        init_metrics();

        // Connect to database
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        // Run migrations only if requested
        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let addr = config.common.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Quoting service listener bound");

        let state = AppState {
            config,
            db: Arc::new(db),
        };

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
        tracing::info!(
            service = %self.state.config.service_name,
            version = %self.state.config.service_version,
            port = self.port,
            "Service ready to accept connections"
        );

        let app = router(self.state);

        axum::serve(self.listener, app).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
