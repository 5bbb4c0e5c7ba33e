//! Notifier implementations: AMQP announcements and log-only fallback

use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::notify::messages::{
    correlation_id_for, routing_key_for, MessageEnvelope, PlayerNotification, Recipient,
    EVENTS_EXCHANGE,
};
use crate::notify::{DisplayNameResolver, Notifier};
use crate::types::{LobbyEvent, UserId};
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
    /// Most recent correlation ids remembered for deduplication
    pub deduplication_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange: EVENTS_EXCHANGE.to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
            deduplication_capacity: 10_000,
        }
    }
}

/// Correlation ids of published messages, oldest evicted first
#[derive(Debug)]
struct PublishedIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl PublishedIds {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: &str) {
        if !self.ids.insert(id.to_string()) {
            return;
        }
        self.order.push_back(id.to_string());

        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }
}

/// Publishes player announcements to the events topic exchange
pub struct AmqpNotifier {
    channel: Channel,
    config: PublisherConfig,
    names: Arc<dyn DisplayNameResolver>,
    metrics: Arc<MetricsCollector>,
    published_messages: Mutex<PublishedIds>, // For deduplication
}

impl AmqpNotifier {
    /// Create a notifier and declare its exchange
    pub async fn new(
        channel: Channel,
        config: PublisherConfig,
        names: Arc<dyn DisplayNameResolver>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Self> {
        let published_messages = Mutex::new(PublishedIds::new(config.deduplication_capacity));
        let notifier = Self {
            channel,
            config,
            names,
            metrics,
            published_messages,
        };

        notifier.setup_exchange().await?;

        Ok(notifier)
    }

    /// Declare the events topic exchange
    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.config.exchange, "topic")
            .durable(true)
            .finish();
        self.channel.exchange_declare(args).await.map_err(|e| {
            MatchmakingError::NotificationFailed {
                message: format!("Failed to declare exchange {}: {}", self.config.exchange, e),
            }
        })?;

        info!("Declared AMQP exchange {}", self.config.exchange);
        Ok(())
    }

    fn already_published(&self, correlation_id: &str) -> Result<bool> {
        let published = self
            .published_messages
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("published messages"))?;
        Ok(published.contains(correlation_id))
    }

    fn mark_published(&self, correlation_id: &str) -> Result<()> {
        let mut published = self
            .published_messages
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("published messages"))?;
        published.insert(correlation_id);
        Ok(())
    }

    /// Publish with retry and exponential backoff
    async fn publish(&self, envelope: &MessageEnvelope<PlayerNotification>) -> Result<()> {
        if self.config.enable_deduplication && self.already_published(&envelope.correlation_id)? {
            debug!(
                "Message {} already published, skipping",
                envelope.correlation_id
            );
            return Ok(());
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            let started = Instant::now();
            match self.try_publish(envelope).await {
                Ok(()) => {
                    self.metrics
                        .record_amqp_operation("publish", true, started.elapsed());
                    if self.config.enable_deduplication {
                        self.mark_published(&envelope.correlation_id)?;
                    }

                    debug!(
                        "Published message {} with routing key {}",
                        envelope.correlation_id, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    self.metrics
                        .record_amqp_operation("publish", false, started.elapsed());
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish(&self, envelope: &MessageEnvelope<PlayerNotification>) -> Result<()> {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(&self.config.exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| MatchmakingError::NotificationFailed {
                message: format!("Failed to publish message: {}", e),
            })
    }

    /// Forget every published message id
    pub fn clear_deduplication_cache(&self) {
        if let Ok(mut published) = self.published_messages.lock() {
            published.clear();
        }
    }

    /// Number of cached message ids (for monitoring)
    pub fn cached_message_count(&self) -> usize {
        self.published_messages
            .lock()
            .map(|cache| cache.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Notifier for AmqpNotifier {
    async fn notify_players(&self, players: Vec<UserId>, event: LobbyEvent) -> Result<()> {
        let mut recipients = Vec::with_capacity(players.len());
        for user_id in players {
            let display_name = self.names.resolve_display_name(&user_id).await;
            recipients.push(Recipient {
                user_id,
                display_name,
            });
        }

        let routing_key = routing_key_for(&event).to_string();
        let correlation_id = correlation_id_for(&event);
        let notification = PlayerNotification {
            community_id: event.community_id().to_string(),
            recipients,
            event,
        };

        let envelope =
            MessageEnvelope::with_correlation_id(notification, routing_key, correlation_id);
        self.publish(&envelope).await
    }
}

/// Notifier used when AMQP is disabled: announcements only go to the log
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_players(&self, players: Vec<UserId>, event: LobbyEvent) -> Result<()> {
        info!(
            "[{}] {} -> {} players: {:?}",
            event.community_id(),
            event.name(),
            players.len(),
            players
        );
        Ok(())
    }
}
