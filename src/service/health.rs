//! Health checks
//!
//! Liveness only asks whether the service is running. Readiness also needs
//! the matchmaking stores to answer. The full check adds the AMQP connection,
//! which can only degrade the service since notifications are best effort.

use crate::notify::AmqpConnection;
use crate::service::matchmaking::{MatchmakingService, MatchmakingStats};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Value exported on the health gauge
    pub fn code(self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        if self.code() <= other.code() {
            self
        } else {
            other
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Everything a health check looks at
#[derive(Clone)]
pub struct HealthContext {
    pub service_name: String,
    pub matchmaking: Arc<MatchmakingService>,
    /// None when AMQP is disabled
    pub amqp: Option<Arc<AmqpConnection>>,
    pub is_running: Arc<RwLock<bool>>,
    pub started_at: Instant,
}

impl HealthContext {
    pub fn new(
        service_name: impl Into<String>,
        matchmaking: Arc<MatchmakingService>,
        amqp: Option<Arc<AmqpConnection>>,
        is_running: Arc<RwLock<bool>>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            matchmaking,
            amqp,
            is_running,
            started_at: Instant::now(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: Option<MatchmakingStats>,
    pub uptime_seconds: u64,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Why the component is not healthy, or a note about its mode
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(ctx: &HealthContext) -> Result<Self> {
        let checks = vec![
            Self::check_service_running(ctx).await,
            Self::check_matchmaking(ctx),
            Self::check_amqp(ctx),
        ];
        let status = checks
            .iter()
            .fold(HealthStatus::Healthy, |status, check| status.worst(check.status));

        let stats = match ctx.matchmaking.stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                debug!("Failed to gather stats for health check: {}", e);
                None
            }
        };

        Ok(HealthCheck {
            status,
            service: ctx.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
            uptime_seconds: ctx.started_at.elapsed().as_secs(),
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(ctx: &HealthContext) -> HealthStatus {
        if *ctx.is_running.read().await {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Readiness check - verify service can handle requests
    pub async fn readiness_check(ctx: &HealthContext) -> HealthStatus {
        if !*ctx.is_running.read().await {
            return HealthStatus::Unhealthy;
        }
        Self::check_matchmaking(ctx).status
    }

    async fn check_service_running(ctx: &HealthContext) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if *ctx.is_running.read().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_matchmaking(ctx: &HealthContext) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match ctx.matchmaking.stats() {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Matchmaking stores unavailable: {}", e);
                (HealthStatus::Unhealthy, Some(e.to_string()))
            }
        };

        ComponentCheck {
            name: "matchmaking".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_amqp(ctx: &HealthContext) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match &ctx.amqp {
            None => (
                HealthStatus::Healthy,
                Some("AMQP disabled, notifications are logged only".to_string()),
            ),
            Some(connection) if connection.is_alive() => (HealthStatus::Healthy, None),
            Some(_) => (
                HealthStatus::Degraded,
                Some("AMQP connection closed, notifications are being dropped".to_string()),
            ),
        };

        ComponentCheck {
            name: "amqp_connection".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
