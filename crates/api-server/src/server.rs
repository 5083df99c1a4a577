//! HTTP server assembly — route table, middleware, metrics exporter.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use leadpulse_analytics::AnalyticsEngine;
use leadpulse_core::config::AppConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the application router. Separated from serving so tests can drive
/// it in-process.
pub fn router(state: AppState) -> Router {
    Router::new()
        // Event ingestion and query
        .route("/v1/events", post(rest::ingest_event).get(rest::query_events))
        // Analytics
        .route("/v1/analytics/summary", get(rest::summary))
        .route("/v1/analytics/timeseries", get(rest::timeseries))
        .route("/v1/analytics/attribution", get(rest::attribution))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Main API server for the analytics engine.
pub struct ApiServer {
    config: AppConfig,
    engine: Arc<AnalyticsEngine>,
}

impl ApiServer {
    pub fn new(config: AppConfig, engine: Arc<AnalyticsEngine>) -> Self {
        Self { config, engine }
    }

    /// Start the HTTP server; blocks until shutdown.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let state = AppState {
            engine: self.engine.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
            default_query_limit: self.config.event_store.default_query_limit,
        };

        let app = router(state);
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the Prometheus exporter on its own port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}
