//! HTTP surface of the service
//!
//! One axum router serves the matchmaking commands and queries alongside the
//! health, readiness and Prometheus endpoints.

pub mod error;
pub mod handlers;
pub mod monitoring;

pub use error::ApiError;

use crate::metrics::MetricsCollector;
use crate::service::health::HealthContext;
use crate::service::matchmaking::MatchmakingService;
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for every handler
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<MatchmakingService>,
    pub metrics: Arc<MetricsCollector>,
    /// Absent until the application has been initialised
    pub health: Option<HealthContext>,
}

impl ApiState {
    pub fn new(service: Arc<MatchmakingService>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            service,
            metrics,
            health: None,
        }
    }

    pub fn with_health(mut self, health: HealthContext) -> Self {
        self.health = Some(health);
        self
    }
}

/// Build the router with all endpoints
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(monitoring::root_handler))
        .route("/health", get(monitoring::health_handler))
        .route("/ready", get(monitoring::ready_handler))
        .route("/alive", get(monitoring::alive_handler))
        .route("/metrics", get(monitoring::metrics_handler))
        .route("/stats", get(monitoring::stats_handler))
        .route("/queue/join", post(handlers::join_queue))
        .route("/queue/leave", post(handlers::leave_queue))
        .route(
            "/ready-checks/{lobby_id}/respond",
            post(handlers::respond_ready_check),
        )
        .route("/matches/{match_id}", get(handlers::get_match))
        .route("/matches/{match_id}/report", post(handlers::report_match))
        .route("/matches/{match_id}/approve", post(handlers::approve_match))
        .route("/matches/{match_id}/void", post(handlers::void_match))
        .route("/lobbies/{lobby_id}", get(handlers::get_lobby))
        .route("/leaderboard/{game_id}", get(handlers::leaderboard))
        .with_state(state)
}

/// HTTP server with broadcast-driven graceful shutdown
pub struct HttpServer {
    config: HttpServerConfig,
    state: ApiState,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: ApiState) -> Self {
        Self { config, state }
    }

    /// Serve until a shutdown signal arrives on `shutdown`
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid HTTP server address")?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;

        info!("HTTP server listening on http://{}", addr);

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("HTTP server shutdown signal received");
            })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}
