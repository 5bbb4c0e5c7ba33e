//! Error types for the matchmaking service
//!
//! Core operations return the typed [`MatchmakingError`] so callers can tell
//! a lost race from a validation failure. Bootstrap code (configuration,
//! servers, `main`) uses `anyhow` instead.

use crate::types::{GameModeId, LobbyId, MatchId, UserId};

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, MatchmakingError>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Player {user_id} is already queued for game mode {game_mode_id}")]
    AlreadyQueued {
        user_id: UserId,
        game_mode_id: GameModeId,
    },

    #[error("Player {user_id} is already in ready-check lobby {lobby_id}")]
    AlreadyInLobby { user_id: UserId, lobby_id: LobbyId },

    #[error("Unknown or inactive game mode: {game_mode}")]
    UnknownGameMode { game_mode: String },

    #[error("Queue for game mode {game_mode_id} changed before extraction")]
    StaleExtraction { game_mode_id: GameModeId },

    #[error("Player {user_id} is not a participant of {context}")]
    NotAParticipant { user_id: UserId, context: String },

    #[error("Player {user_id} already responded to lobby {lobby_id}")]
    AlreadyResponded { user_id: UserId, lobby_id: LobbyId },

    #[error("Match {match_id} is already finished")]
    AlreadyFinished { match_id: MatchId },

    #[error("Match {match_id} is already voided")]
    AlreadyVoided { match_id: MatchId },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Rating history missing for match {match_id}, ratings were not reverted")]
    RatingReversalUnavailable { match_id: MatchId },

    #[error("Voice provisioning failed: {reason}")]
    VoiceProvisioningFailed { reason: String },

    #[error("Notification delivery failed: {message}")]
    NotificationFailed { message: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    pub fn lobby_not_found(lobby_id: LobbyId) -> Self {
        Self::NotFound {
            entity: "Lobby",
            id: lobby_id.to_string(),
        }
    }

    pub fn match_not_found(match_id: MatchId) -> Self {
        Self::NotFound {
            entity: "Match",
            id: match_id.to_string(),
        }
    }

    /// Error for a poisoned store lock
    pub fn lock_poisoned(what: &str) -> Self {
        Self::InternalError {
            message: format!("Failed to acquire {} lock", what),
        }
    }

    /// Races that are resolved by the next trigger rather than by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StaleExtraction { .. })
    }
}
