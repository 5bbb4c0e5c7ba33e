//! Game mode registry
//!
//! A game mode describes what a queue fills up to: team size, the rating pool
//! (`game_id`) it feeds, and whether voice channels are provisioned for its
//! matches.

use crate::error::{MatchmakingError, Result};
use crate::types::{CommunityId, GameId, GameModeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Largest team size a mode may declare
pub const MAX_TEAM_SIZE: usize = 16;

/// Configuration for a queueable game mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMode {
    pub id: GameModeId,
    pub community_id: CommunityId,
    /// Rating pool shared by every mode of the same game
    pub game_id: GameId,
    pub name: String,
    /// Players per team
    pub team_size: usize,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Whether matches get per-team voice channels
    #[serde(default)]
    pub voice_channels: bool,
}

fn default_active() -> bool {
    true
}

impl GameMode {
    /// Create an active mode without voice channels
    pub fn new(
        id: impl Into<GameModeId>,
        community_id: impl Into<CommunityId>,
        game_id: impl Into<GameId>,
        name: impl Into<String>,
        team_size: usize,
    ) -> Self {
        Self {
            id: id.into(),
            community_id: community_id.into(),
            game_id: game_id.into(),
            name: name.into(),
            team_size,
            active: true,
            voice_channels: false,
        }
    }

    pub fn with_voice_channels(mut self, enabled: bool) -> Self {
        self.voice_channels = enabled;
        self
    }

    /// Players needed to start a ready check
    pub fn required_players(&self) -> usize {
        self.team_size * 2
    }
}

/// Trait for resolving game modes
pub trait GameModeProvider: Send + Sync {
    /// Get an active mode by id
    fn get_mode(&self, game_mode_id: &str) -> Result<GameMode>;

    /// Find an active mode of a community by name, case-insensitively
    fn find_by_name(&self, community_id: &str, name: &str) -> Result<GameMode>;

    /// All active modes of a community
    fn modes_for_community(&self, community_id: &str) -> Vec<GameMode>;

    /// Validate a mode definition
    fn validate_mode(&self, mode: &GameMode) -> Result<()>;
}

/// Game mode provider backed by the service configuration
#[derive(Debug, Clone, Default)]
pub struct StaticGameModeProvider {
    modes: HashMap<GameModeId, GameMode>,
}

impl StaticGameModeProvider {
    /// Build a provider from configured modes, rejecting invalid or duplicate ones
    pub fn new(modes: Vec<GameMode>) -> Result<Self> {
        let mut provider = Self::default();
        for mode in modes {
            provider.add_mode(mode)?;
        }
        Ok(provider)
    }

    /// Register an additional mode
    pub fn add_mode(&mut self, mode: GameMode) -> Result<()> {
        self.validate_mode(&mode)?;

        if self.modes.contains_key(&mode.id) {
            return Err(MatchmakingError::ConfigurationError {
                message: format!("Duplicate game mode id: {}", mode.id),
            });
        }

        let name_taken = self.modes.values().any(|existing| {
            existing.community_id == mode.community_id
                && existing.name.eq_ignore_ascii_case(&mode.name)
        });
        if name_taken {
            return Err(MatchmakingError::ConfigurationError {
                message: format!(
                    "Game mode name '{}' already used in community {}",
                    mode.name, mode.community_id
                ),
            });
        }

        self.modes.insert(mode.id.clone(), mode);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

impl GameModeProvider for StaticGameModeProvider {
    fn get_mode(&self, game_mode_id: &str) -> Result<GameMode> {
        self.modes
            .get(game_mode_id)
            .filter(|mode| mode.active)
            .cloned()
            .ok_or_else(|| MatchmakingError::UnknownGameMode {
                game_mode: game_mode_id.to_string(),
            })
    }

    fn find_by_name(&self, community_id: &str, name: &str) -> Result<GameMode> {
        self.modes
            .values()
            .find(|mode| {
                mode.active
                    && mode.community_id == community_id
                    && mode.name.eq_ignore_ascii_case(name)
            })
            .cloned()
            .ok_or_else(|| MatchmakingError::UnknownGameMode {
                game_mode: name.to_string(),
            })
    }

    fn modes_for_community(&self, community_id: &str) -> Vec<GameMode> {
        let mut modes: Vec<GameMode> = self
            .modes
            .values()
            .filter(|mode| mode.active && mode.community_id == community_id)
            .cloned()
            .collect();
        modes.sort_by(|a, b| a.name.cmp(&b.name));
        modes
    }

    fn validate_mode(&self, mode: &GameMode) -> Result<()> {
        if mode.id.trim().is_empty() {
            return Err(MatchmakingError::ConfigurationError {
                message: "Game mode id cannot be empty".to_string(),
            });
        }

        if mode.name.trim().is_empty() {
            return Err(MatchmakingError::ConfigurationError {
                message: format!("Game mode {} must have a name", mode.id),
            });
        }

        if mode.game_id.trim().is_empty() {
            return Err(MatchmakingError::ConfigurationError {
                message: format!("Game mode {} must reference a game", mode.id),
            });
        }

        if mode.team_size == 0 || mode.team_size > MAX_TEAM_SIZE {
            return Err(MatchmakingError::ConfigurationError {
                message: format!(
                    "Game mode {} team size must be between 1 and {}",
                    mode.id, MAX_TEAM_SIZE
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> StaticGameModeProvider {
        StaticGameModeProvider::new(vec![
            GameMode::new("cs2-1v1", "guild", "cs2", "1v1", 1),
            GameMode::new("cs2-5v5", "guild", "cs2", "5v5", 5).with_voice_channels(true),
            GameMode::new("lol-5v5", "other-guild", "lol", "5v5", 5),
        ])
        .unwrap()
    }

    #[test]
    fn test_required_players() {
        let mode = GameMode::new("m", "g", "game", "3v3", 3);
        assert_eq!(mode.required_players(), 6);
    }

    #[test]
    fn test_lookup_by_name_is_case_insensitive() {
        let provider = provider();
        let mode = provider.find_by_name("guild", "1V1").unwrap();
        assert_eq!(mode.id, "cs2-1v1");

        // Same name in a different community resolves separately
        let other = provider.find_by_name("other-guild", "5v5").unwrap();
        assert_eq!(other.id, "lol-5v5");

        assert!(matches!(
            provider.find_by_name("guild", "2v2"),
            Err(MatchmakingError::UnknownGameMode { .. })
        ));
    }

    #[test]
    fn test_inactive_modes_are_unknown() {
        let mut inactive = GameMode::new("old", "guild", "cs2", "legacy", 2);
        inactive.active = false;
        let provider = StaticGameModeProvider::new(vec![inactive]).unwrap();

        assert!(provider.get_mode("old").is_err());
        assert!(provider.find_by_name("guild", "legacy").is_err());
        assert!(provider.modes_for_community("guild").is_empty());
    }

    #[test]
    fn test_modes_share_rating_pool() {
        let provider = provider();
        let small = provider.get_mode("cs2-1v1").unwrap();
        let large = provider.get_mode("cs2-5v5").unwrap();
        assert_eq!(small.game_id, large.game_id);
        assert_eq!(provider.modes_for_community("guild").len(), 2);
    }

    #[test]
    fn test_mode_validation() {
        assert!(StaticGameModeProvider::new(vec![GameMode::new("m", "g", "x", "0v0", 0)]).is_err());
        assert!(StaticGameModeProvider::new(vec![GameMode::new("m", "g", "x", "big", 17)]).is_err());
        assert!(StaticGameModeProvider::new(vec![GameMode::new("", "g", "x", "1v1", 1)]).is_err());
        assert!(StaticGameModeProvider::new(vec![
            GameMode::new("a", "g", "x", "1v1", 1),
            GameMode::new("a", "g", "x", "2v2", 2),
        ])
        .is_err());
        assert!(StaticGameModeProvider::new(vec![
            GameMode::new("a", "g", "x", "Duel", 1),
            GameMode::new("b", "g", "x", "duel", 1),
        ])
        .is_err());
    }

    #[test]
    fn test_mode_deserializes_with_defaults() {
        let mode: GameMode = toml::from_str(
            r#"
            id = "cs2-2v2"
            community_id = "guild"
            game_id = "cs2"
            name = "2v2"
            team_size = 2
            "#,
        )
        .unwrap();
        assert!(mode.active);
        assert!(!mode.voice_channels);
    }
}
