//! Match storage

use crate::error::{MatchmakingError, Result};
use crate::game::instance::{Match, MatchStatus};
use crate::types::{MatchId, Winner};
use crate::utils::current_timestamp;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;

/// Match counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchCounts {
    pub ongoing: usize,
    pub pending_approval: usize,
    pub finished: usize,
    pub voided: usize,
}

/// Trait for match storage operations
pub trait MatchStore: Send + Sync {
    fn insert(&self, game: Match) -> Result<()>;

    fn get(&self, match_id: MatchId) -> Result<Option<Match>>;

    /// Apply `change` atomically; a failed change leaves the match untouched
    fn update(
        &self,
        match_id: MatchId,
        change: &mut dyn FnMut(&mut Match) -> Result<()>,
    ) -> Result<Match>;

    /// Finish a match that is still open
    fn finish(&self, match_id: MatchId, winner: Winner) -> Result<Match> {
        let now = current_timestamp();
        self.update(match_id, &mut |game| game.finish(winner, now))
    }

    fn counts(&self) -> Result<MatchCounts>;
}

/// In-memory match storage implementation
#[derive(Debug, Default)]
pub struct InMemoryMatchStore {
    matches: RwLock<HashMap<MatchId, Match>>,
}

impl InMemoryMatchStore {
    /// Create a new in-memory match store
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStore for InMemoryMatchStore {
    fn insert(&self, game: Match) -> Result<()> {
        let mut matches = self
            .matches
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("match write"))?;

        if matches.contains_key(&game.id) {
            return Err(MatchmakingError::InternalError {
                message: format!("Match {} already exists", game.id),
            });
        }
        matches.insert(game.id, game);
        Ok(())
    }

    fn get(&self, match_id: MatchId) -> Result<Option<Match>> {
        let matches = self
            .matches
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("match read"))?;

        Ok(matches.get(&match_id).cloned())
    }

    fn update(
        &self,
        match_id: MatchId,
        change: &mut dyn FnMut(&mut Match) -> Result<()>,
    ) -> Result<Match> {
        let mut matches = self
            .matches
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("match write"))?;

        let stored = matches
            .get_mut(&match_id)
            .ok_or_else(|| MatchmakingError::match_not_found(match_id))?;

        let mut updated = stored.clone();
        change(&mut updated)?;
        *stored = updated.clone();

        Ok(updated)
    }

    fn counts(&self) -> Result<MatchCounts> {
        let matches = self
            .matches
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("match read"))?;

        let mut counts = MatchCounts::default();
        for game in matches.values() {
            match game.status {
                MatchStatus::Ongoing => counts.ongoing += 1,
                MatchStatus::PendingApproval => counts.pending_approval += 1,
                MatchStatus::Finished => counts.finished += 1,
                MatchStatus::Voided => counts.voided += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Team;
    use uuid::Uuid;

    fn duel() -> Match {
        Match::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "duel".to_string(),
            "chess".to_string(),
            "guild".to_string(),
            &["a".to_string()],
            &["b".to_string()],
            current_timestamp(),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let store = InMemoryMatchStore::new();
        let game = duel();
        let id = game.id;

        store.insert(game.clone()).unwrap();
        assert_eq!(store.get(id).unwrap(), Some(game.clone()));
        assert!(store.insert(game).is_err());
    }

    #[test]
    fn test_finish_once() {
        let store = InMemoryMatchStore::new();
        let game = duel();
        let id = game.id;
        store.insert(game).unwrap();

        let finished = store.finish(id, Winner::Team(Team::One)).unwrap();
        assert_eq!(finished.status, MatchStatus::Finished);

        assert!(matches!(
            store.finish(id, Winner::Team(Team::Two)),
            Err(MatchmakingError::AlreadyFinished { .. })
        ));
        let stored = store.get(id).unwrap().unwrap();
        assert_eq!(stored.winner, Some(Winner::Team(Team::One)));
    }

    #[test]
    fn test_update_missing_match() {
        let store = InMemoryMatchStore::new();
        let result = store.update(Uuid::new_v4(), &mut |_| Ok(()));
        assert!(matches!(result, Err(MatchmakingError::NotFound { .. })));
    }

    #[test]
    fn test_counts() {
        let store = InMemoryMatchStore::new();
        let first = duel();
        let first_id = first.id;
        store.insert(first).unwrap();
        store.insert(duel()).unwrap();
        store
            .update(first_id, &mut |game| game.void("abandoned").map(|_| ()))
            .unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.ongoing, 1);
        assert_eq!(counts.voided, 1);
    }
}
