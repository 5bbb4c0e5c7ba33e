//! External collaborators: player notifications, voice channels, display names
//!
//! The matchmaking core only talks to these traits. Notifications and voice
//! provisioning are best effort: failures are logged and counted, never
//! propagated to the caller of a matchmaking operation.

pub mod connection;
pub mod messages;
pub mod names;
pub mod publisher;
pub mod voice;

use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::types::{LobbyEvent, MatchId, UserId, VoiceChannels};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use connection::{AmqpConfig, AmqpConnection};
pub use messages::{MessageEnvelope, PlayerNotification, EVENTS_EXCHANGE};
pub use names::StaticDisplayNames;
pub use publisher::{AmqpNotifier, LogNotifier, PublisherConfig};
pub use voice::UnconfiguredVoiceProvisioner;

/// Delivers lobby and match announcements to players
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_players(&self, players: Vec<UserId>, event: LobbyEvent) -> Result<()>;
}

/// Creates per-team voice channels for a match
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceProvisioner: Send + Sync {
    async fn provision_voice(
        &self,
        community_id: String,
        match_id: MatchId,
        team1: Vec<UserId>,
        team2: Vec<UserId>,
    ) -> Result<VoiceChannels>;
}

/// Resolves a player's display name for announcements
#[async_trait]
pub trait DisplayNameResolver: Send + Sync {
    async fn resolve_display_name(&self, user_id: &str) -> String;
}

/// Send a notification, logging and counting failures instead of returning them
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    metrics: &MetricsCollector,
    players: Vec<UserId>,
    event: LobbyEvent,
) {
    let name = event.name();
    let recipients = players.len();

    match notifier.notify_players(players, event).await {
        Ok(()) => debug!("Delivered {} to {} players", name, recipients),
        Err(e) => {
            warn!("Failed to deliver {} to {} players: {}", name, recipients, e);
            metrics.record_notification_failure(name);
        }
    }
}

/// Deliver a notification on its own task so the caller never waits on the
/// broker; failures are logged and counted by the task
pub fn notify_in_background(
    notifier: Arc<dyn Notifier>,
    metrics: Arc<MetricsCollector>,
    players: Vec<UserId>,
    event: LobbyEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        notify_best_effort(notifier.as_ref(), &metrics, players, event).await;
    })
}
