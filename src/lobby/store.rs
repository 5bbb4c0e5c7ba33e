//! Lobby storage
//!
//! Holds ready-check lobbies together with two indexes: which open lobby each
//! player is in, and the deadlines of open lobbies for the expiry sweep. All
//! status changes go through [`LobbyStore::transition`], which applies a
//! state-machine step as one atomic read-modify-write.

use crate::error::{MatchmakingError, Result};
use crate::lobby::instance::{ReadyCheckLobby, Transition};
use crate::types::{LobbyId, UserId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

/// Trait for lobby storage operations
pub trait LobbyStore: Send + Sync {
    /// Persist a new lobby.
    ///
    /// Fails with `AlreadyInLobby` if any member is already in an open lobby.
    fn insert(&self, lobby: ReadyCheckLobby) -> Result<()>;

    fn get(&self, lobby_id: LobbyId) -> Result<Option<ReadyCheckLobby>>;

    /// Apply `step` to a lobby atomically.
    ///
    /// The step runs on a copy; the copy replaces the stored lobby only if the
    /// step succeeds, so a rejected step leaves nothing half-applied. Returns
    /// the step's transition and the lobby as stored afterward.
    fn transition(
        &self,
        lobby_id: LobbyId,
        step: &mut dyn FnMut(&mut ReadyCheckLobby) -> Result<Transition>,
    ) -> Result<(Transition, ReadyCheckLobby)>;

    /// Open lobby a player is currently in
    fn open_lobby_for(&self, user_id: &str) -> Result<Option<LobbyId>>;

    /// Open lobbies whose deadline is at or before `now`
    fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<LobbyId>>;

    /// Remove settled lobbies that settled before `cutoff`
    fn prune_settled(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Number of lobbies still in ready check
    fn open_count(&self) -> Result<usize>;
}

#[derive(Debug, Default)]
struct LobbyTables {
    lobbies: HashMap<LobbyId, ReadyCheckLobby>,
    /// Player -> open lobby
    in_lobby: HashMap<UserId, LobbyId>,
    /// (expires_at, lobby) of open lobbies
    deadlines: BTreeSet<(DateTime<Utc>, LobbyId)>,
}

impl LobbyTables {
    fn release(&mut self, lobby: &ReadyCheckLobby) {
        for member in &lobby.members {
            if self.in_lobby.get(&member.user_id) == Some(&lobby.id) {
                self.in_lobby.remove(&member.user_id);
            }
        }
        self.deadlines.remove(&(lobby.expires_at, lobby.id));
    }
}

/// In-memory lobby storage implementation
#[derive(Debug, Default)]
pub struct InMemoryLobbyStore {
    tables: RwLock<LobbyTables>,
}

impl InMemoryLobbyStore {
    /// Create a new in-memory lobby store
    pub fn new() -> Self {
        Self::default()
    }
}

impl LobbyStore for InMemoryLobbyStore {
    fn insert(&self, lobby: ReadyCheckLobby) -> Result<()> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("lobby write"))?;

        if tables.lobbies.contains_key(&lobby.id) {
            return Err(MatchmakingError::InternalError {
                message: format!("Lobby {} already exists", lobby.id),
            });
        }

        for member in &lobby.members {
            if let Some(existing) = tables.in_lobby.get(&member.user_id) {
                return Err(MatchmakingError::AlreadyInLobby {
                    user_id: member.user_id.clone(),
                    lobby_id: *existing,
                });
            }
        }

        if !lobby.is_settled() {
            for member in &lobby.members {
                tables.in_lobby.insert(member.user_id.clone(), lobby.id);
            }
            tables.deadlines.insert((lobby.expires_at, lobby.id));
        }
        tables.lobbies.insert(lobby.id, lobby);

        Ok(())
    }

    fn get(&self, lobby_id: LobbyId) -> Result<Option<ReadyCheckLobby>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("lobby read"))?;

        Ok(tables.lobbies.get(&lobby_id).cloned())
    }

    fn transition(
        &self,
        lobby_id: LobbyId,
        step: &mut dyn FnMut(&mut ReadyCheckLobby) -> Result<Transition>,
    ) -> Result<(Transition, ReadyCheckLobby)> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("lobby write"))?;

        let mut lobby = tables
            .lobbies
            .get(&lobby_id)
            .cloned()
            .ok_or_else(|| MatchmakingError::lobby_not_found(lobby_id))?;

        let was_settled = lobby.is_settled();
        let transition = step(&mut lobby)?;

        if !was_settled && lobby.is_settled() {
            tables.release(&lobby);
        }
        tables.lobbies.insert(lobby_id, lobby.clone());

        Ok((transition, lobby))
    }

    fn open_lobby_for(&self, user_id: &str) -> Result<Option<LobbyId>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("lobby read"))?;

        Ok(tables.in_lobby.get(user_id).copied())
    }

    fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<LobbyId>> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("lobby read"))?;

        Ok(tables
            .deadlines
            .iter()
            .take_while(|(expires_at, _)| *expires_at <= now)
            .map(|(_, lobby_id)| *lobby_id)
            .collect())
    }

    fn prune_settled(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("lobby write"))?;

        let before = tables.lobbies.len();
        tables
            .lobbies
            .retain(|_, lobby| lobby.settled_at.map_or(true, |settled| settled >= cutoff));

        Ok(before - tables.lobbies.len())
    }

    fn open_count(&self) -> Result<usize> {
        let tables = self
            .tables
            .read()
            .map_err(|_| MatchmakingError::lock_poisoned("lobby read"))?;

        Ok(tables.deadlines.len())
    }
}
