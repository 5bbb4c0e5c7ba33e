//! Rally Point - ready-check matchmaking for community game modes
//!
//! Players queue for a game mode; once enough are waiting the oldest are
//! pulled into a ready-check lobby. When everyone accepts, a match with two
//! balanced teams starts, and an approved result is applied to per-game Elo
//! ratings with history that allows voided matches to be reverted.

pub mod config;
pub mod error;
pub mod game;
pub mod http;
pub mod lobby;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod rating;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use lobby::{GameMode, GameModeProvider, StaticGameModeProvider};
pub use notify::{Notifier, VoiceProvisioner};
pub use service::{MatchmakingService, MatchmakingSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
