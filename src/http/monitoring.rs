//! Health, readiness and Prometheus endpoints

use crate::http::ApiState;
use crate::service::health::{HealthCheck, HealthStatus};
use axum::{extract::State, http::header, http::StatusCode, response::IntoResponse, Json};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use tracing::{debug, error};

/// Root endpoint handler - shows service information
pub async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "rally-point",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/health",
            "/ready",
            "/alive",
            "/metrics",
            "/stats",
            "/queue/join",
            "/queue/leave",
            "/ready-checks/{lobbyId}/respond",
            "/matches/{matchId}/report",
            "/matches/{matchId}/approve",
            "/matches/{matchId}/void",
            "/lobbies/{lobbyId}",
            "/matches/{matchId}",
            "/leaderboard/{gameId}"
        ]
    }))
}

/// Full health check endpoint handler
pub async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    debug!("Health check requested");

    let Some(ctx) = &state.health else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": HealthStatus::Unhealthy,
                "service": "rally-point",
                "version": env!("CARGO_PKG_VERSION"),
                "error": "Service not initialized"
            })),
        );
    };

    match HealthCheck::check(ctx).await {
        Ok(health) => {
            let code = match health.status {
                HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
                HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            };
            (code, Json(json!(health)))
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": HealthStatus::Unhealthy,
                    "service": ctx.service_name,
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint handler
pub async fn ready_handler(State(state): State<ApiState>) -> impl IntoResponse {
    debug!("Readiness check requested");

    match &state.health {
        Some(ctx) => match HealthCheck::readiness_check(ctx).await {
            HealthStatus::Healthy => (StatusCode::OK, "Ready"),
            HealthStatus::Degraded => (StatusCode::OK, "Degraded but ready"),
            HealthStatus::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
        },
        None => (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized"),
    }
}

/// Liveness check endpoint handler
pub async fn alive_handler(State(state): State<ApiState>) -> impl IntoResponse {
    debug!("Liveness check requested");

    match &state.health {
        Some(ctx) => match HealthCheck::liveness_check(ctx).await {
            HealthStatus::Healthy => (StatusCode::OK, "Alive"),
            _ => (StatusCode::SERVICE_UNAVAILABLE, "Not alive"),
        },
        None => (StatusCode::SERVICE_UNAVAILABLE, "Service not initialized"),
    }
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler(State(state): State<ApiState>) -> impl IntoResponse {
    debug!("Metrics endpoint requested");

    let metric_families = state.metrics.registry().gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(output) => {
            debug!("Serving {} metric families", metric_families.len());
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, encoder.format_type().to_string())],
                output,
            )
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                "Failed to encode metrics".to_string(),
            )
        }
    }
}

/// Matchmaking statistics endpoint handler (for debugging/human consumption)
pub async fn stats_handler(State(state): State<ApiState>) -> impl IntoResponse {
    debug!("Stats endpoint requested");

    match state.service.stats() {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "service": {
                    "name": "rally-point",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "queues": {
                    "active": stats.active_queues,
                    "playersWaiting": stats.players_waiting
                },
                "lobbies": {
                    "open": stats.open_lobbies
                },
                "matches": stats.matches,
                "timestamp": chrono::Utc::now()
            })),
        ),
        Err(e) => {
            error!("Failed to get stats: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "Failed to get service stats",
                    "timestamp": chrono::Utc::now()
                })),
            )
        }
    }
}
