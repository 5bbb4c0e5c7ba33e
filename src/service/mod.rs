//! Service layer for the rally-point matchmaking service
//!
//! The matchmaking facade, the production application state that wires it to
//! its collaborators, and health checks.

pub mod app;
pub mod health;
pub mod matchmaking;

pub use app::{AppState, ServiceError};
pub use health::{ComponentCheck, HealthCheck, HealthContext, HealthStatus};
pub use matchmaking::{
    JoinOutcome, MatchmakingService, MatchmakingSettings, MatchmakingStats, Stores,
};
