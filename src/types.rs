//! Common types used throughout the matchmaking service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for players
pub type UserId = String;

/// Unique identifier for communities (guilds)
pub type CommunityId = String;

/// Unique identifier for configured game modes
pub type GameModeId = String;

/// Identifier of the game a rating pool belongs to
pub type GameId = String;

/// Unique identifier for ready-check lobbies
pub type LobbyId = Uuid;

/// Unique identifier for matches
pub type MatchId = Uuid;

/// One side of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    One,
    Two,
}

impl Team {
    /// Wire number of the team (1 or 2)
    pub fn number(self) -> u8 {
        match self {
            Team::One => 1,
            Team::Two => 2,
        }
    }

    pub fn opponent(self) -> Team {
        match self {
            Team::One => Team::Two,
            Team::Two => Team::One,
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Team {}", self.number())
    }
}

/// Approved result of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    Team(Team),
    Draw,
}

impl Winner {
    /// Parse the wire representation: 0 = draw, 1 = team one, 2 = team two
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Winner::Draw),
            1 => Some(Winner::Team(Team::One)),
            2 => Some(Winner::Team(Team::Two)),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Winner::Draw => 0,
            Winner::Team(team) => team.number(),
        }
    }
}

/// Why a ready-check lobby was cancelled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancelReason {
    /// A member explicitly refused the ready check
    Declined { user_id: UserId },
    /// The deadline passed with members still pending
    Timeout { non_responders: Vec<UserId> },
}

impl CancelReason {
    /// Metrics/log label for the reason
    pub fn label(&self) -> &'static str {
        match self {
            CancelReason::Declined { .. } => "declined",
            CancelReason::Timeout { .. } => "timeout",
        }
    }
}

/// Channel references returned by voice provisioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceChannels {
    pub team1_channel: String,
    pub team2_channel: String,
}

/// Announcement sent when a queue fills and a ready check starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyCreated {
    pub lobby_id: LobbyId,
    pub game_mode_id: GameModeId,
    pub community_id: CommunityId,
    pub players: Vec<UserId>,
    pub expires_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

/// Announcement sent when every member accepted and the match is live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStarted {
    pub match_id: MatchId,
    pub lobby_id: LobbyId,
    pub game_mode_id: GameModeId,
    pub community_id: CommunityId,
    pub team1: Vec<UserId>,
    pub team2: Vec<UserId>,
    pub voice: Option<VoiceChannels>,
    pub timestamp: DateTime<Utc>,
}

/// Announcement sent when a ready check is declined or times out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyCancelled {
    pub lobby_id: LobbyId,
    pub game_mode_id: GameModeId,
    pub community_id: CommunityId,
    pub reason: CancelReason,
    /// Members put back into the queue with their original join time
    pub requeued: Vec<UserId>,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all player notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LobbyEvent {
    LobbyCreated(LobbyCreated),
    MatchStarted(MatchStarted),
    LobbyCancelled(LobbyCancelled),
}

impl LobbyEvent {
    /// Short event name used for logging and test assertions
    pub fn name(&self) -> &'static str {
        match self {
            LobbyEvent::LobbyCreated(_) => "LobbyCreated",
            LobbyEvent::MatchStarted(_) => "MatchStarted",
            LobbyEvent::LobbyCancelled(_) => "LobbyCancelled",
        }
    }

    pub fn community_id(&self) -> &str {
        match self {
            LobbyEvent::LobbyCreated(e) => &e.community_id,
            LobbyEvent::MatchStarted(e) => &e.community_id,
            LobbyEvent::LobbyCancelled(e) => &e.community_id,
        }
    }
}
