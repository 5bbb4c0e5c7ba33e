//! AMQP message definitions and serialization

use crate::error::{MatchmakingError, Result};
use crate::types::{LobbyEvent, UserId};
use serde::{Deserialize, Serialize};

/// Topic exchange all matchmaking announcements are published to
pub const EVENTS_EXCHANGE: &str = "rally_point.events";

/// Routing keys for events
pub const LOBBY_CREATED_ROUTING_KEY: &str = "lobby.created";
pub const MATCH_STARTED_ROUTING_KEY: &str = "match.started";
pub const LOBBY_CANCELLED_ROUTING_KEY: &str = "lobby.cancelled";

/// Message envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope with a random correlation id
    pub fn new(payload: T, routing_key: String) -> Self {
        Self::with_correlation_id(payload, routing_key, uuid::Uuid::new_v4().to_string())
    }

    pub fn with_correlation_id(payload: T, routing_key: String, correlation_id: String) -> Self {
        Self {
            payload,
            correlation_id,
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| MatchmakingError::InternalError {
            message: format!("Failed to serialize message: {}", e),
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| MatchmakingError::InvalidRequest {
            reason: format!("Failed to deserialize message: {}", e),
        })
    }
}

/// A player addressed by an announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: UserId,
    pub display_name: String,
}

/// Announcement payload: the event plus who it is for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerNotification {
    pub community_id: String,
    pub recipients: Vec<Recipient>,
    pub event: LobbyEvent,
}

/// Routing key for an event
pub fn routing_key_for(event: &LobbyEvent) -> &'static str {
    match event {
        LobbyEvent::LobbyCreated(_) => LOBBY_CREATED_ROUTING_KEY,
        LobbyEvent::MatchStarted(_) => MATCH_STARTED_ROUTING_KEY,
        LobbyEvent::LobbyCancelled(_) => LOBBY_CANCELLED_ROUTING_KEY,
    }
}

/// Stable id per announcement, so a replayed notification is published once
pub fn correlation_id_for(event: &LobbyEvent) -> String {
    match event {
        LobbyEvent::LobbyCreated(e) => format!("lobby.created:{}", e.lobby_id),
        LobbyEvent::MatchStarted(e) => format!("match.started:{}", e.match_id),
        LobbyEvent::LobbyCancelled(e) => format!("lobby.cancelled:{}", e.lobby_id),
    }
}
