//! Metrics for the rally-point matchmaking service
//!
//! Prometheus counters, gauges and histograms for queues, ready checks,
//! matches and rating application. Exposed over HTTP by [`crate::http`].

pub mod collector;

pub use collector::{
    LobbyMetrics, MatchMetrics, MetricsCollector, MetricsTimer, PerformanceMetrics, QueueMetrics,
    ServiceMetrics,
};
