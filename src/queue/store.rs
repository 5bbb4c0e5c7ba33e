//! Queue storage interface and in-memory implementation
//!
//! Each game mode has an ordered waiting list. Ordering is by `joined_at`,
//! with the store-assigned `sequence` as the tie-break, so two players joining
//! in the same instant still have a stable order.

use crate::error::{MatchmakingError, Result};
use crate::types::{GameModeId, UserId};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// A player waiting in one game mode's queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub game_mode_id: GameModeId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
    /// Insertion counter, tie-break after `joined_at`
    pub sequence: u64,
}

impl QueueEntry {
    fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.joined_at, self.sequence)
    }
}

/// Trait for queue storage operations
///
/// Every method is atomic with respect to the others.
pub trait QueueStore: Send + Sync {
    /// Add a player to a mode's queue
    fn join(&self, game_mode_id: &str, user_id: &str) -> Result<QueueEntry>;

    /// Put an entry back with its original join time.
    ///
    /// Returns false if the player is already queued for that mode.
    fn requeue(&self, entry: QueueEntry) -> Result<bool>;

    /// Remove a player from one mode, or from every mode when `None`
    fn leave(&self, user_id: &str, game_mode_id: Option<&str>) -> Result<Vec<QueueEntry>>;

    /// Number of players waiting for a mode
    fn count(&self, game_mode_id: &str) -> Result<usize>;

    /// Waiting players of a mode, oldest first
    fn entries(&self, game_mode_id: &str) -> Result<Vec<QueueEntry>>;

    /// Modes a player is currently queued for
    fn queued_modes(&self, user_id: &str) -> Result<Vec<GameModeId>>;

    /// The `n` oldest entries of a mode
    fn peek_oldest(&self, game_mode_id: &str, n: usize) -> Result<Vec<QueueEntry>>;

    /// Remove exactly `user_ids` from a mode's queue.
    ///
    /// Fails with `StaleExtraction` and removes nothing if any of them is no
    /// longer queued.
    fn extract(&self, game_mode_id: &str, user_ids: &[UserId]) -> Result<Vec<QueueEntry>>;

    /// Modes with at least one waiting player
    fn active_modes(&self) -> Result<Vec<GameModeId>>;

    /// Players waiting across all modes
    fn total_waiting(&self) -> Result<usize>;
}

#[derive(Debug, Default)]
struct QueueTables {
    /// Per-mode entries kept sorted by (joined_at, sequence)
    queues: HashMap<GameModeId, Vec<QueueEntry>>,
    next_sequence: u64,
}

impl QueueTables {
    fn insert_sorted(&mut self, entry: QueueEntry) {
        let queue = self.queues.entry(entry.game_mode_id.clone()).or_default();
        let key = entry.order_key();
        let position = queue.partition_point(|existing| existing.order_key() <= key);
        queue.insert(position, entry);
    }

    fn contains(&self, game_mode_id: &str, user_id: &str) -> bool {
        self.queues
            .get(game_mode_id)
            .is_some_and(|queue| queue.iter().any(|entry| entry.user_id == user_id))
    }

    fn drop_empty(&mut self) {
        self.queues.retain(|_, queue| !queue.is_empty());
    }
}

/// In-memory queue storage implementation
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    tables: RwLock<QueueTables>,
}

impl InMemoryQueueStore {
    /// Create a new in-memory queue store
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueStore for InMemoryQueueStore {
    fn join(&self, game_mode_id: &str, user_id: &str) -> Result<QueueEntry> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("queue write"))?;

        if tables.contains(game_mode_id, user_id) {
            return Err(MatchmakingError::AlreadyQueued {
                user_id: user_id.to_string(),
                game_mode_id: game_mode_id.to_string(),
            });
        }

        tables.next_sequence += 1;
        let entry = QueueEntry {
            game_mode_id: game_mode_id.to_string(),
            user_id: user_id.to_string(),
            joined_at: current_timestamp(),
            sequence: tables.next_sequence,
        };
        tables.insert_sorted(entry.clone());

        Ok(entry)
    }

    fn requeue(&self, entry: QueueEntry) -> Result<bool> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("queue write"))?;

        if tables.contains(&entry.game_mode_id, &entry.user_id) {
            return Ok(false);
        }

        tables.next_sequence = tables.next_sequence.max(entry.sequence);
        tables.insert_sorted(entry);
        Ok(true)
    }

    fn leave(&self, user_id: &str, game_mode_id: Option<&str>) -> Result<Vec<QueueEntry>> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("queue write"))?;

        let mut removed = Vec::new();
        for (mode, queue) in tables.queues.iter_mut() {
            if game_mode_id.is_some_and(|wanted| wanted != mode.as_str()) {
                continue;
            }
            if let Some(position) = queue.iter().position(|entry| entry.user_id == user_id) {
                removed.push(queue.remove(position));
            }
        }
        tables.drop_empty();

        Ok(removed)
    }

    fn count(&self, game_mode_id: &str) -> Result<usize> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("queue read"))?;

        Ok(tables.queues.get(game_mode_id).map_or(0, Vec::len))
    }

    fn entries(&self, game_mode_id: &str) -> Result<Vec<QueueEntry>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("queue read"))?;

        Ok(tables.queues.get(game_mode_id).cloned().unwrap_or_default())
    }

    fn queued_modes(&self, user_id: &str) -> Result<Vec<GameModeId>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("queue read"))?;

        let mut modes: Vec<GameModeId> = tables
            .queues
            .iter()
            .filter(|(_, queue)| queue.iter().any(|entry| entry.user_id == user_id))
            .map(|(mode, _)| mode.clone())
            .collect();
        modes.sort();

        Ok(modes)
    }

    fn peek_oldest(&self, game_mode_id: &str, n: usize) -> Result<Vec<QueueEntry>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("queue read"))?;

        Ok(tables
            .queues
            .get(game_mode_id)
            .map(|queue| queue.iter().take(n).cloned().collect())
            .unwrap_or_default())
    }

    fn extract(&self, game_mode_id: &str, user_ids: &[UserId]) -> Result<Vec<QueueEntry>> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("queue write"))?;

        let stale = || MatchmakingError::StaleExtraction {
            game_mode_id: game_mode_id.to_string(),
        };

        let queue = tables.queues.get_mut(game_mode_id).ok_or_else(stale)?;
        if !user_ids
            .iter()
            .all(|user_id| queue.iter().any(|entry| &entry.user_id == user_id))
        {
            return Err(stale());
        }

        let mut extracted = Vec::with_capacity(user_ids.len());
        queue.retain(|entry| {
            if user_ids.contains(&entry.user_id) {
                extracted.push(entry.clone());
                false
            } else {
                true
            }
        });
        tables.drop_empty();

        Ok(extracted)
    }

    fn active_modes(&self) -> Result<Vec<GameModeId>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("queue read"))?;

        let mut modes: Vec<GameModeId> = tables.queues.keys().cloned().collect();
        modes.sort();
        Ok(modes)
    }

    fn total_waiting(&self) -> Result<usize> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("queue read"))?;

        Ok(tables.queues.values().map(Vec::len).sum())
    }
}
