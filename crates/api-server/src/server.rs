//! API server — assembles the HTTP router and the metrics exporter.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use checkin_analytics::StatsAggregator;
use checkin_core::config::AppConfig;
use checkin_engine::CheckinProcessor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct ApiServer {
    config: AppConfig,
    processor: Arc<CheckinProcessor>,
    analytics: Arc<StatsAggregator>,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        processor: Arc<CheckinProcessor>,
        analytics: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            config,
            processor,
            analytics,
        }
    }

    /// Start the HTTP server. Blocks until shutdown.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let state = AppState {
            processor: self.processor.clone(),
            analytics: self.analytics.clone(),
            node_id: self.config.node_id.clone(),
            start_time: Instant::now(),
            default_history_days: self.config.analytics.default_history_days,
            max_history_days: self.config.analytics.max_history_days,
        };

        let app = Router::new()
            // Check-in and rewards endpoints
            .route("/v1/checkin", post(rest::handle_checkin))
            .route("/v1/checkin/:user_id", get(rest::handle_checkin_state))
            .route("/v1/rewards/:user_id", get(rest::handle_rewards))
            .route("/v1/analytics/:user_id", get(rest::handle_analytics))
            .route(
                "/v1/analytics/:user_id/history",
                get(rest::handle_history),
            )
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the Prometheus metrics exporter on its own port.
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
