//! Rating storage interface and implementations
//!
//! The store owns both the current per-game rating of every player and the
//! append-only history of changes. History is the source of truth: a player's
//! rating always equals the initial rating plus the sum of their non-reverted
//! history changes for that game.

use crate::error::{MatchmakingError, Result};
use crate::rating::elo::Outcome;
use crate::types::{GameId, MatchId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Current rating and record of a player in one game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRating {
    pub user_id: UserId,
    pub game_id: GameId,
    pub rating: i32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub updated_at: DateTime<Utc>,
}

impl PlayerRating {
    /// Create a fresh rating row for a player's first resolved match
    pub fn new(user_id: UserId, game_id: GameId, initial_rating: i32) -> Self {
        Self {
            user_id,
            game_id,
            rating: initial_rating,
            wins: 0,
            losses: 0,
            draws: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn games_played(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    fn record(&mut self, outcome: Outcome, change: i32) {
        self.rating += change;
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Draw => self.draws += 1,
        }
        self.updated_at = Utc::now();
    }

    fn unrecord(&mut self, outcome: Outcome, change: i32) {
        self.rating -= change;
        match outcome {
            Outcome::Win => self.wins = self.wins.saturating_sub(1),
            Outcome::Loss => self.losses = self.losses.saturating_sub(1),
            Outcome::Draw => self.draws = self.draws.saturating_sub(1),
        }
        self.updated_at = Utc::now();
    }
}

/// Rating change to apply to one participant of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingUpdate {
    pub user_id: UserId,
    pub outcome: Outcome,
    pub change: i32,
}

/// Audit row written once per (match, player)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingHistoryEntry {
    pub match_id: MatchId,
    pub user_id: UserId,
    pub game_id: GameId,
    pub old_rating: i32,
    pub new_rating: i32,
    pub change: i32,
    pub outcome: Outcome,
    pub created_at: DateTime<Utc>,
    pub reverted_at: Option<DateTime<Utc>>,
}

impl RatingHistoryEntry {
    pub fn is_reverted(&self) -> bool {
        self.reverted_at.is_some()
    }
}

/// Result of applying a match's rating updates
#[derive(Debug, Clone)]
pub struct AppliedRatings {
    /// History rows of the match, in update order
    pub entries: Vec<RatingHistoryEntry>,
    /// False when every row already existed and nothing changed
    pub newly_applied: bool,
}

/// Trait for rating storage operations
pub trait RatingStorage: Send + Sync {
    /// Rating assigned to players without a row for a game
    fn initial_rating(&self) -> i32;

    /// Get a player's rating for a game
    fn get_rating(&self, user_id: &str, game_id: &str) -> Result<Option<PlayerRating>>;

    /// Get ratings for multiple players in one game; missing players are absent
    fn get_ratings(
        &self,
        user_ids: &[UserId],
        game_id: &str,
    ) -> Result<HashMap<UserId, PlayerRating>>;

    /// Apply all updates of a match as one atomic unit.
    ///
    /// Idempotent on (match_id, user_id): updates whose history row already
    /// exists are skipped, so replaying a resolution never double-applies.
    fn apply_match(
        &self,
        match_id: MatchId,
        game_id: &str,
        updates: &[RatingUpdate],
    ) -> Result<AppliedRatings>;

    /// Undo a match's rating impact using its history rows.
    ///
    /// Returns the rows reverted by this call (empty if they were all reverted
    /// already). Fails with `RatingReversalUnavailable` when the match has no
    /// history at all.
    fn revert_match(&self, match_id: MatchId) -> Result<Vec<RatingHistoryEntry>>;

    /// History rows written for a match
    fn history_for_match(&self, match_id: MatchId) -> Result<Vec<RatingHistoryEntry>>;

    /// History rows of a player in one game, oldest first
    fn history_for_player(&self, user_id: &str, game_id: &str)
        -> Result<Vec<RatingHistoryEntry>>;

    /// Highest rated players of a game
    fn leaderboard(&self, game_id: &str, limit: usize) -> Result<Vec<PlayerRating>>;
}

#[derive(Debug, Default)]
struct RatingTables {
    ratings: HashMap<(UserId, GameId), PlayerRating>,
    history: HashMap<MatchId, Vec<RatingHistoryEntry>>,
}

/// In-memory rating storage implementation
#[derive(Debug)]
pub struct InMemoryRatingStorage {
    tables: RwLock<RatingTables>,
    initial_rating: i32,
}

impl InMemoryRatingStorage {
    /// Create a new in-memory rating storage
    pub fn new(initial_rating: i32) -> Self {
        Self {
            tables: RwLock::new(RatingTables::default()),
            initial_rating,
        }
    }

    /// Check that a player's cached rating matches their history
    pub fn is_consistent(&self, user_id: &str, game_id: &str) -> Result<bool> {
        let rating = self
            .get_rating(user_id, game_id)?
            .map(|r| r.rating)
            .unwrap_or(self.initial_rating);
        let applied: i32 = self
            .history_for_player(user_id, game_id)?
            .iter()
            .filter(|entry| !entry.is_reverted())
            .map(|entry| entry.change)
            .sum();

        Ok(rating == self.initial_rating + applied)
    }

    /// Seed a rating row directly (imports and tests)
    pub fn insert_rating(&self, rating: PlayerRating) -> Result<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("ratings write"))?;
        tables
            .ratings
            .insert((rating.user_id.clone(), rating.game_id.clone()), rating);
        Ok(())
    }
}

impl Default for InMemoryRatingStorage {
    fn default() -> Self {
        Self::new(1200)
    }
}

impl RatingStorage for InMemoryRatingStorage {
    fn initial_rating(&self) -> i32 {
        self.initial_rating
    }

    fn get_rating(&self, user_id: &str, game_id: &str) -> Result<Option<PlayerRating>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("ratings read"))?;

        Ok(tables
            .ratings
            .get(&(user_id.to_string(), game_id.to_string()))
            .cloned())
    }

    fn get_ratings(
        &self,
        user_ids: &[UserId],
        game_id: &str,
    ) -> Result<HashMap<UserId, PlayerRating>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("ratings read"))?;

        let mut result = HashMap::new();
        for user_id in user_ids {
            if let Some(entry) = tables.ratings.get(&(user_id.clone(), game_id.to_string())) {
                result.insert(user_id.clone(), entry.clone());
            }
        }

        Ok(result)
    }

    fn apply_match(
        &self,
        match_id: MatchId,
        game_id: &str,
        updates: &[RatingUpdate],
    ) -> Result<AppliedRatings> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("ratings write"))?;
        let RatingTables { ratings, history } = &mut *tables;

        let rows = history.entry(match_id).or_default();
        let mut newly_applied = false;

        for update in updates {
            if rows.iter().any(|row| row.user_id == update.user_id) {
                continue;
            }

            let rating = ratings
                .entry((update.user_id.clone(), game_id.to_string()))
                .or_insert_with(|| {
                    PlayerRating::new(
                        update.user_id.clone(),
                        game_id.to_string(),
                        self.initial_rating,
                    )
                });

            let old_rating = rating.rating;
            rating.record(update.outcome, update.change);

            rows.push(RatingHistoryEntry {
                match_id,
                user_id: update.user_id.clone(),
                game_id: game_id.to_string(),
                old_rating,
                new_rating: rating.rating,
                change: update.change,
                outcome: update.outcome,
                created_at: Utc::now(),
                reverted_at: None,
            });
            newly_applied = true;
        }

        let entries = rows.clone();
        if entries.is_empty() {
            history.remove(&match_id);
        }

        Ok(AppliedRatings {
            entries,
            newly_applied,
        })
    }

    fn revert_match(&self, match_id: MatchId) -> Result<Vec<RatingHistoryEntry>> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("ratings write"))?;
        let RatingTables { ratings, history } = &mut *tables;

        let rows = history
            .get_mut(&match_id)
            .filter(|rows| !rows.is_empty())
            .ok_or(MatchmakingError::RatingReversalUnavailable { match_id })?;

        let now = Utc::now();
        let mut reverted = Vec::new();
        for row in rows.iter_mut().filter(|row| !row.is_reverted()) {
            if let Some(rating) = ratings.get_mut(&(row.user_id.clone(), row.game_id.clone())) {
                rating.unrecord(row.outcome, row.change);
            }
            row.reverted_at = Some(now);
            reverted.push(row.clone());
        }

        Ok(reverted)
    }

    fn history_for_match(&self, match_id: MatchId) -> Result<Vec<RatingHistoryEntry>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("ratings read"))?;

        Ok(tables.history.get(&match_id).cloned().unwrap_or_default())
    }

    fn history_for_player(
        &self,
        user_id: &str,
        game_id: &str,
    ) -> Result<Vec<RatingHistoryEntry>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("ratings read"))?;

        let mut rows: Vec<RatingHistoryEntry> = tables
            .history
            .values()
            .flatten()
            .filter(|row| row.user_id == user_id && row.game_id == game_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.created_at);

        Ok(rows)
    }

    fn leaderboard(&self, game_id: &str, limit: usize) -> Result<Vec<PlayerRating>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("ratings read"))?;

        let mut entries: Vec<PlayerRating> = tables
            .ratings
            .values()
            .filter(|entry| entry.game_id == game_id)
            .cloned()
            .collect();

        // Sort by rating (descending), then by wins
        entries.sort_by(|a, b| b.rating.cmp(&a.rating).then(b.wins.cmp(&a.wins)));
        entries.truncate(limit);

        Ok(entries)
    }
}
