//! Main application state and service coordination
//!
//! Wires the matchmaking pipeline to its collaborators (AMQP or log
//! notifications, voice provisioning), then runs the HTTP server, the
//! deadline sweeper and the health metrics task until shutdown.

use crate::config::AppConfig;
use crate::http::{ApiState, HttpServer, HttpServerConfig};
use crate::lobby::{DeadlineSweeper, StaticGameModeProvider, SweepTarget};
use crate::metrics::MetricsCollector;
use crate::notify::{
    AmqpConfig, AmqpConnection, AmqpNotifier, LogNotifier, Notifier, PublisherConfig,
    StaticDisplayNames, UnconfiguredVoiceProvisioner,
};
use crate::service::health::{HealthCheck, HealthContext};
use crate::service::matchmaking::MatchmakingService;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// How often the health gauges are refreshed
const HEALTH_METRICS_INTERVAL: Duration = Duration::from_secs(30);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    metrics: Arc<MetricsCollector>,

    matchmaking: Arc<MatchmakingService>,

    /// None when notifications only go to the log
    amqp_connection: Option<Arc<AmqpConnection>>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    shutdown_tx: broadcast::Sender<()>,

    is_running: Arc<RwLock<bool>>,

    started_at: Instant,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing rally-point matchmaking service");
        info!(
            "Configuration: service={}, game_modes={}, amqp_enabled={}",
            config.service.name,
            config.game_modes.len(),
            config.amqp.enabled
        );

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);

        let modes = StaticGameModeProvider::new(config.game_modes.clone()).map_err(|e| {
            ServiceError::Configuration {
                message: format!("Invalid game modes: {}", e),
            }
        })?;
        if modes.is_empty() {
            warn!("No game modes configured, every join will be rejected");
        }

        let (amqp_connection, notifier) = if config.amqp.enabled {
            let connection = Self::initialize_amqp(&config).await?;
            let notifier = Self::initialize_notifier(&config, &connection, metrics.clone()).await?;
            (Some(connection), notifier)
        } else {
            info!("AMQP disabled, player notifications will only be logged");
            (None, Arc::new(LogNotifier::new()) as Arc<dyn Notifier>)
        };

        let matchmaking = Arc::new(MatchmakingService::new(
            Arc::new(modes),
            notifier,
            Arc::new(UnconfiguredVoiceProvisioner::new()),
            metrics.clone(),
            config.matchmaking_settings(),
        ));

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            metrics,
            matchmaking,
            amqp_connection,
            background_tasks: Vec::new(),
            shutdown_tx,
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Start the HTTP server and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting rally-point matchmaking service");

        *self.is_running.write().await = true;

        self.start_http_server();
        self.start_sweeper();
        self.start_health_metrics();

        info!(
            "Rally-point service started with {} background tasks",
            self.background_tasks.len()
        );
        Ok(())
    }

    /// Signal every task to stop and wait for them up to the configured timeout
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of rally-point service");

        *self.is_running.write().await = false;

        if self.shutdown_tx.send(()).is_err() {
            debug!("No background task was listening for shutdown");
        }

        self.stop_background_tasks().await;

        let final_stats =
            self.matchmaking
                .stats()
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;
        info!("Final service statistics: {:?}", final_stats);

        if let Some(connection) = self.amqp_connection.take() {
            match Arc::try_unwrap(connection) {
                Ok(connection) => {
                    if let Err(e) = connection.close().await {
                        warn!("Failed to close AMQP connection: {}", e);
                    } else {
                        info!("AMQP connection closed");
                    }
                }
                Err(_) => debug!("AMQP connection still shared, dropping it"),
            }
        }

        info!("Rally-point service shutdown completed");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn matchmaking(&self) -> Arc<MatchmakingService> {
        self.matchmaking.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Everything the health checks look at
    pub fn health_context(&self) -> HealthContext {
        HealthContext {
            service_name: self.config.service.name.clone(),
            matchmaking: self.matchmaking.clone(),
            amqp: self.amqp_connection.clone(),
            is_running: self.is_running.clone(),
            started_at: self.started_at,
        }
    }

    /// State shared by the HTTP handlers
    pub fn api_state(&self) -> ApiState {
        ApiState::new(self.matchmaking.clone(), self.metrics.clone())
            .with_health(self.health_context())
    }

    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker");

        let mut amqp_config =
            AmqpConfig::from_url(&config.amqp.url).map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;
        amqp_config.max_retries = config.amqp.max_retry_attempts;
        amqp_config.retry_delay_ms = config.amqp.retry_delay_ms;

        let connection =
            AmqpConnection::new(amqp_config)
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: format!("Failed to connect to AMQP: {}", e),
                })?;

        Ok(Arc::new(connection))
    }

    async fn initialize_notifier(
        config: &AppConfig,
        connection: &AmqpConnection,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Arc<dyn Notifier>, ServiceError> {
        let channel = connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open publisher channel: {}", e),
            })?;

        let publisher_config = PublisherConfig {
            exchange: config.amqp.exchange_name.clone(),
            max_retries: config.amqp.max_retry_attempts,
            retry_delay_ms: config.amqp.retry_delay_ms,
            enable_deduplication: true,
            ..PublisherConfig::default()
        };

        let notifier = AmqpNotifier::new(
            channel,
            publisher_config,
            Arc::new(StaticDisplayNames::new(HashMap::new())),
            metrics,
        )
        .await
        .map_err(|e| ServiceError::Initialization {
            message: format!("Failed to initialize AMQP notifier: {}", e),
        })?;

        Ok(Arc::new(notifier))
    }

    fn start_http_server(&mut self) {
        let server_config = HttpServerConfig {
            host: self.config.service.http_host.clone(),
            port: self.config.service.http_port,
        };
        info!(
            "Starting HTTP server on {}:{}",
            server_config.host, server_config.port
        );

        let server = HttpServer::new(server_config, self.api_state());
        let shutdown = self.shutdown_tx.subscribe();

        self.background_tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                error!("HTTP server failed: {:#}", e);
            }
        }));
    }

    fn start_sweeper(&mut self) {
        let interval = self.config.sweep_interval();
        info!("Starting deadline sweeper ({}s interval)", interval.as_secs());

        let target: Arc<dyn SweepTarget> = self.matchmaking.clone();
        let handle = DeadlineSweeper::new(target, interval).spawn(self.shutdown_tx.subscribe());
        self.background_tasks.push(handle);
    }

    fn start_health_metrics(&mut self) {
        let ctx = self.health_context();
        let metrics = self.metrics.clone();
        let mut shutdown = self.shutdown_tx.subscribe();

        self.background_tasks.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_METRICS_INTERVAL);
            info!("Health metrics task started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.recv() => break,
                }

                metrics
                    .service()
                    .uptime_seconds
                    .set(ctx.started_at.elapsed().as_secs() as i64);

                match HealthCheck::check(&ctx).await {
                    Ok(health) => {
                        metrics.update_health_status(health.status.code());
                        for check in &health.checks {
                            metrics.update_component_health(
                                &check.name,
                                check.status.code() > 0,
                            );
                        }
                        debug!(
                            "Health: {} - {:?}",
                            health.status,
                            health.stats.as_ref().map(|s| s.players_waiting)
                        );
                    }
                    Err(e) => warn!("Health check failed: {}", e),
                }
            }

            info!("Health metrics task stopped");
        }));
    }

    /// Wait for tasks to finish after the shutdown broadcast, aborting stragglers
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout();

        for (i, mut task) in self.background_tasks.drain(..).enumerate() {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => debug!("Background task {}/{} stopped", i + 1, task_count),
                Ok(Err(e)) => warn!("Background task {}/{} failed: {}", i + 1, task_count, e),
                Err(_) => {
                    warn!(
                        "Background task {}/{} did not stop in time, aborting",
                        i + 1,
                        task_count
                    );
                    task.abort();
                }
            }
        }

        info!("All {} background tasks stopped", task_count);
    }
}
