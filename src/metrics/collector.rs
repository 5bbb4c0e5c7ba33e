//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the rally-point matchmaking
//! service using Prometheus metrics.

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Queue-related metrics
    queue_metrics: QueueMetrics,

    /// Ready-check lobby metrics
    lobby_metrics: LobbyMetrics,

    /// Match and rating metrics
    match_metrics: MatchMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages published
    pub amqp_messages_total: IntCounterVec,

    /// Player notifications that could not be delivered
    pub notification_failures_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Queue-related metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Total queue joins
    pub joins_total: IntCounterVec,

    /// Total queue leaves
    pub leaves_total: IntCounterVec,

    /// Players currently waiting per game mode
    pub players_waiting: IntGaugeVec,

    /// Extractions lost to a concurrent coordinator
    pub extraction_conflicts_total: IntCounterVec,

    /// Accepted members put back in queue after a cancelled ready check
    pub requeued_total: IntCounterVec,
}

/// Ready-check lobby metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    /// Lobbies currently in ready check
    pub active_lobbies: IntGauge,

    /// Total lobbies created
    pub lobbies_created_total: IntCounterVec,

    /// Ready-check results (converted, declined, timeout)
    pub ready_check_outcomes_total: IntCounterVec,

    /// Settled lobbies removed by retention
    pub lobbies_pruned_total: IntCounter,
}

/// Match and rating metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Total matches created
    pub matches_created_total: IntCounterVec,

    /// Matches finished by approval, by result
    pub matches_finished_total: IntCounterVec,

    /// Matches voided, by whether ratings were reverted
    pub matches_voided_total: IntCounterVec,

    /// Failed voice channel provisioning attempts
    pub voice_failures_total: IntCounter,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Rating application time
    pub rating_application_duration: Histogram,

    /// Coordinator operation durations
    pub operation_duration: HistogramVec,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let lobby_metrics = LobbyMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            lobby_metrics,
            match_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get queue metrics
    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    /// Get lobby metrics
    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    /// Get match metrics
    pub fn matches(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Record a player joining a queue
    pub fn record_queue_join(&self, game_mode_id: &str, waiting: usize) {
        self.queue_metrics
            .joins_total
            .with_label_values(&[game_mode_id])
            .inc();
        self.set_players_waiting(game_mode_id, waiting);
    }

    /// Record a player leaving a queue
    pub fn record_queue_leave(&self, game_mode_id: &str, waiting: usize) {
        self.queue_metrics
            .leaves_total
            .with_label_values(&[game_mode_id])
            .inc();
        self.set_players_waiting(game_mode_id, waiting);
    }

    pub fn set_players_waiting(&self, game_mode_id: &str, waiting: usize) {
        self.queue_metrics
            .players_waiting
            .with_label_values(&[game_mode_id])
            .set(waiting as i64);
    }

    /// Record an extraction that lost the race to another coordinator
    pub fn record_extraction_conflict(&self, game_mode_id: &str) {
        self.queue_metrics
            .extraction_conflicts_total
            .with_label_values(&[game_mode_id])
            .inc();
    }

    pub fn record_requeued(&self, game_mode_id: &str, players: usize) {
        self.queue_metrics
            .requeued_total
            .with_label_values(&[game_mode_id])
            .inc_by(players as u64);
    }

    /// Record a ready-check lobby being created
    pub fn record_lobby_created(&self, game_mode_id: &str) {
        self.lobby_metrics
            .lobbies_created_total
            .with_label_values(&[game_mode_id])
            .inc();
        self.lobby_metrics.active_lobbies.inc();
    }

    /// Record a ready check settling (converted, declined or timeout)
    pub fn record_ready_check_outcome(&self, outcome: &str) {
        self.lobby_metrics
            .ready_check_outcomes_total
            .with_label_values(&[outcome])
            .inc();
        self.lobby_metrics.active_lobbies.dec();
    }

    pub fn record_lobbies_pruned(&self, count: usize) {
        self.lobby_metrics.lobbies_pruned_total.inc_by(count as u64);
    }

    /// Record a match going live
    pub fn record_match_created(&self, game_mode_id: &str) {
        self.match_metrics
            .matches_created_total
            .with_label_values(&[game_mode_id])
            .inc();
    }

    /// Record an approved match result ("team1", "team2" or "draw")
    pub fn record_match_finished(&self, result: &str) {
        self.match_metrics
            .matches_finished_total
            .with_label_values(&[result])
            .inc();
    }

    pub fn record_match_voided(&self, reverted: bool) {
        let label = if reverted { "reverted" } else { "not_reverted" };
        self.match_metrics
            .matches_voided_total
            .with_label_values(&[label])
            .inc();
    }

    pub fn record_voice_failure(&self) {
        self.match_metrics.voice_failures_total.inc();
    }

    /// Record a notification that could not be delivered
    pub fn record_notification_failure(&self, event: &str) {
        self.service_metrics
            .notification_failures_total
            .with_label_values(&[event])
            .inc();
    }

    /// Record rating application duration
    pub fn record_rating_application(&self, duration: Duration) {
        self.performance_metrics
            .rating_application_duration
            .observe(duration.as_secs_f64());
    }

    /// Record coordinator operation duration
    pub fn record_operation(&self, operation: &str, duration: Duration) {
        self.performance_metrics
            .operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("rally_point_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "rally_point_amqp_messages_total",
                "Total AMQP messages published",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let notification_failures_total = IntCounterVec::new(
            Opts::new(
                "rally_point_notification_failures_total",
                "Player notifications that failed to send",
            ),
            &["event"],
        )?;
        registry.register(Box::new(notification_failures_total.clone()))?;

        let health_status = IntGauge::new(
            "rally_point_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("rally_point_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            notification_failures_total,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let joins_total = IntCounterVec::new(
            Opts::new("rally_point_queue_joins_total", "Total queue joins"),
            &["game_mode"],
        )?;
        registry.register(Box::new(joins_total.clone()))?;

        let leaves_total = IntCounterVec::new(
            Opts::new("rally_point_queue_leaves_total", "Total queue leaves"),
            &["game_mode"],
        )?;
        registry.register(Box::new(leaves_total.clone()))?;

        let players_waiting = IntGaugeVec::new(
            Opts::new(
                "rally_point_players_waiting",
                "Players currently waiting in queue",
            ),
            &["game_mode"],
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let extraction_conflicts_total = IntCounterVec::new(
            Opts::new(
                "rally_point_extraction_conflicts_total",
                "Queue extractions lost to a concurrent coordinator",
            ),
            &["game_mode"],
        )?;
        registry.register(Box::new(extraction_conflicts_total.clone()))?;

        let requeued_total = IntCounterVec::new(
            Opts::new(
                "rally_point_requeued_players_total",
                "Players returned to queue after a cancelled ready check",
            ),
            &["game_mode"],
        )?;
        registry.register(Box::new(requeued_total.clone()))?;

        Ok(Self {
            joins_total,
            leaves_total,
            players_waiting,
            extraction_conflicts_total,
            requeued_total,
        })
    }
}

impl LobbyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_lobbies = IntGauge::new(
            "rally_point_active_lobbies",
            "Lobbies currently in ready check",
        )?;
        registry.register(Box::new(active_lobbies.clone()))?;

        let lobbies_created_total = IntCounterVec::new(
            Opts::new("rally_point_lobbies_created_total", "Total lobbies created"),
            &["game_mode"],
        )?;
        registry.register(Box::new(lobbies_created_total.clone()))?;

        let ready_check_outcomes_total = IntCounterVec::new(
            Opts::new(
                "rally_point_ready_check_outcomes_total",
                "Ready-check results",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(ready_check_outcomes_total.clone()))?;

        let lobbies_pruned_total = IntCounter::new(
            "rally_point_lobbies_pruned_total",
            "Settled lobbies removed by retention",
        )?;
        registry.register(Box::new(lobbies_pruned_total.clone()))?;

        Ok(Self {
            active_lobbies,
            lobbies_created_total,
            ready_check_outcomes_total,
            lobbies_pruned_total,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_created_total = IntCounterVec::new(
            Opts::new("rally_point_matches_created_total", "Total matches created"),
            &["game_mode"],
        )?;
        registry.register(Box::new(matches_created_total.clone()))?;

        let matches_finished_total = IntCounterVec::new(
            Opts::new(
                "rally_point_matches_finished_total",
                "Matches finished by approval",
            ),
            &["result"],
        )?;
        registry.register(Box::new(matches_finished_total.clone()))?;

        let matches_voided_total = IntCounterVec::new(
            Opts::new("rally_point_matches_voided_total", "Matches voided"),
            &["ratings"],
        )?;
        registry.register(Box::new(matches_voided_total.clone()))?;

        let voice_failures_total = IntCounter::new(
            "rally_point_voice_failures_total",
            "Failed voice channel provisioning attempts",
        )?;
        registry.register(Box::new(voice_failures_total.clone()))?;

        Ok(Self {
            matches_created_total,
            matches_finished_total,
            matches_voided_total,
            voice_failures_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let rating_application_duration = Histogram::with_opts(
            HistogramOpts::new(
                "rally_point_rating_application_duration_seconds",
                "Rating application time",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
        )?;
        registry.register(Box::new(rating_application_duration.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "rally_point_operation_duration_seconds",
                "Coordinator operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "rally_point_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            rating_application_duration,
            operation_duration,
            amqp_operation_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Encoder;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        // Test that we can access all metric groups
        let _service = collector.service();
        let _queue = collector.queue();
        let _lobby = collector.lobby();
        let _matches = collector.matches();
        let _performance = collector.performance();
    }

    #[test]
    fn test_queue_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_queue_join("cs2-1v1", 1);
        collector.record_queue_join("cs2-1v1", 2);
        collector.record_queue_leave("cs2-1v1", 1);
        collector.record_extraction_conflict("cs2-1v1");

        let queue = collector.queue();
        assert_eq!(queue.joins_total.with_label_values(&["cs2-1v1"]).get(), 2);
        assert_eq!(queue.leaves_total.with_label_values(&["cs2-1v1"]).get(), 1);
        assert_eq!(queue.players_waiting.with_label_values(&["cs2-1v1"]).get(), 1);
        assert_eq!(
            queue
                .extraction_conflicts_total
                .with_label_values(&["cs2-1v1"])
                .get(),
            1
        );
    }

    #[test]
    fn test_lobby_gauge_tracks_settlement() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_lobby_created("cs2-1v1");
        collector.record_lobby_created("cs2-1v1");
        collector.record_ready_check_outcome("converted");

        assert_eq!(collector.lobby().active_lobbies.get(), 1);
        assert_eq!(
            collector
                .lobby()
                .ready_check_outcomes_total
                .with_label_values(&["converted"])
                .get(),
            1
        );
    }

    #[test]
    fn test_registry_exports_prefixed_metrics() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        collector.record_match_created("cs2-5v5");
        collector.record_rating_application(Duration::from_micros(50));

        let mut buffer = Vec::new();
        prometheus::TextEncoder::new()
            .encode(&collector.registry().gather(), &mut buffer)
            .unwrap();
        let output = String::from_utf8(buffer).unwrap();

        assert!(output.contains("rally_point_matches_created_total"));
        assert!(output.contains("rally_point_rating_application_duration_seconds"));
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();

        assert!(duration >= Duration::from_millis(10));

        let final_duration = timer.stop();
        assert!(final_duration >= Duration::from_millis(10));
    }
}
