//! Ready-check coordination
//!
//! Creates lobbies from extracted queue entries, applies member responses and
//! deadlines through [`LobbyStore::transition`], and carries out the side
//! effects of each settlement: starting the match on conversion, or requeueing
//! accepted members and announcing the cancellation.

use crate::error::{MatchmakingError, Result};
use crate::game::{Match, MatchLifecycle};
use crate::lobby::instance::{LobbyStatus, MemberResponse, ReadyCheckLobby, Transition};
use crate::lobby::provider::{GameMode, GameModeProvider};
use crate::lobby::store::LobbyStore;
use crate::metrics::MetricsCollector;
use crate::notify::{notify_in_background, Notifier};
use crate::queue::{QueueEntry, QueueStore};
use crate::types::{
    CancelReason, GameModeId, LobbyCancelled, LobbyCreated, LobbyEvent, LobbyId, MatchId, UserId,
};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Ready-check behaviour
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyCheckSettings {
    /// Time members have to respond
    pub timeout: Duration,
    /// Put members who accepted back in the queue when the lobby is cancelled
    pub requeue_accepted_on_cancel: bool,
    /// How long settled lobbies are kept before pruning
    pub retention: Duration,
}

impl Default for ReadyCheckSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            requeue_accepted_on_cancel: true,
            retention: Duration::from_secs(3600),
        }
    }
}

/// What a response or deadline did to a lobby
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyCheckOutcome {
    /// Still waiting on other members
    Pending { accepted: usize, total: usize },
    /// Everyone accepted and the match was started
    MatchStarted { match_id: MatchId },
    /// The lobby was cancelled by this call
    Cancelled {
        lobby_id: LobbyId,
        game_mode_id: GameModeId,
        reason: CancelReason,
        /// Members put back in the queue
        requeued: Vec<UserId>,
    },
    /// Nothing changed; carries the current status
    Unchanged(LobbyStatus),
}

impl ReadyCheckOutcome {
    pub fn all_accepted(&self) -> bool {
        matches!(self, ReadyCheckOutcome::MatchStarted { .. })
    }
}

/// Drives ready-check lobbies from creation to settlement
pub struct ReadyCheckCoordinator {
    lobbies: Arc<dyn LobbyStore>,
    queue: Arc<dyn QueueStore>,
    modes: Arc<dyn GameModeProvider>,
    lifecycle: Arc<MatchLifecycle>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<MetricsCollector>,
    settings: ReadyCheckSettings,
}

impl ReadyCheckCoordinator {
    pub fn new(
        lobbies: Arc<dyn LobbyStore>,
        queue: Arc<dyn QueueStore>,
        modes: Arc<dyn GameModeProvider>,
        lifecycle: Arc<MatchLifecycle>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<MetricsCollector>,
        settings: ReadyCheckSettings,
    ) -> Self {
        Self {
            lobbies,
            queue,
            modes,
            lifecycle,
            notifier,
            metrics,
            settings,
        }
    }

    pub fn settings(&self) -> &ReadyCheckSettings {
        &self.settings
    }

    /// Open a ready check for entries just extracted from a full queue.
    ///
    /// If the lobby cannot be stored the entries are put back in the queue.
    pub async fn create_lobby(
        &self,
        mode: &GameMode,
        entries: Vec<QueueEntry>,
    ) -> Result<ReadyCheckLobby> {
        let timeout = chrono::Duration::from_std(self.settings.timeout).map_err(|e| {
            MatchmakingError::ConfigurationError {
                message: format!("Invalid ready check timeout: {}", e),
            }
        });

        let stored = timeout
            .and_then(|timeout| ReadyCheckLobby::new(mode, &entries, timeout, current_timestamp()))
            .and_then(|lobby| self.lobbies.insert(lobby.clone()).map(|_| lobby));

        let lobby = match stored {
            Ok(lobby) => lobby,
            Err(e) => {
                warn!(
                    "Could not open ready check for {}: {}, returning {} players to the queue",
                    mode.id,
                    e,
                    entries.len()
                );
                for entry in entries {
                    self.queue.requeue(entry)?;
                }
                return Err(e);
            }
        };

        self.metrics.record_lobby_created(&mode.id);
        info!(
            "Ready check {} opened for {} with {} players, expires at {}",
            lobby.id,
            mode.id,
            lobby.members.len(),
            lobby.expires_at
        );

        let event = LobbyEvent::LobbyCreated(LobbyCreated {
            lobby_id: lobby.id,
            game_mode_id: lobby.game_mode_id.clone(),
            community_id: lobby.community_id.clone(),
            players: lobby.player_ids(),
            expires_at: lobby.expires_at,
            timestamp: current_timestamp(),
        });
        notify_in_background(
            self.notifier.clone(),
            self.metrics.clone(),
            lobby.player_ids(),
            event,
        );

        Ok(lobby)
    }

    /// Record a member's accept or decline
    pub async fn respond(
        &self,
        lobby_id: LobbyId,
        user_id: &str,
        accept: bool,
    ) -> Result<ReadyCheckOutcome> {
        let now = current_timestamp();
        let (transition, lobby) = self
            .lobbies
            .transition(lobby_id, &mut |lobby| lobby.respond(user_id, accept, now))?;

        debug!(
            "Player {} {} ready check {}: {:?}",
            user_id,
            if accept { "accepted" } else { "declined" },
            lobby_id,
            transition
        );

        match transition {
            Transition::Pending { accepted, total } => {
                Ok(ReadyCheckOutcome::Pending { accepted, total })
            }
            Transition::Converted { match_id } => self.start_match(&lobby, match_id).await,
            Transition::Cancelled(reason) => self.handle_cancel(&lobby, reason).await,
            Transition::Unchanged(status) => Ok(ReadyCheckOutcome::Unchanged(status)),
        }
    }

    /// Apply the deadline to one lobby; a no-op unless it is due and open
    pub async fn on_deadline_expired(&self, lobby_id: LobbyId) -> Result<ReadyCheckOutcome> {
        self.expire_at(lobby_id, current_timestamp()).await
    }

    /// Expire every open lobby whose deadline is at or before `now`
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<ReadyCheckOutcome>> {
        let due = self.lobbies.due_for_expiry(now)?;
        let mut outcomes = Vec::with_capacity(due.len());

        for lobby_id in due {
            match self.expire_at(lobby_id, now).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!("Failed to expire ready check {}: {}", lobby_id, e),
            }
        }

        Ok(outcomes)
    }

    /// Drop settled lobbies older than the retention window
    pub fn prune_settled(&self, now: DateTime<Utc>) -> Result<usize> {
        let retention = chrono::Duration::from_std(self.settings.retention).map_err(|e| {
            MatchmakingError::ConfigurationError {
                message: format!("Invalid lobby retention: {}", e),
            }
        })?;

        let pruned = self.lobbies.prune_settled(now - retention)?;
        if pruned > 0 {
            self.metrics.record_lobbies_pruned(pruned);
            debug!("Pruned {} settled lobbies", pruned);
        }
        Ok(pruned)
    }

    pub fn get_lobby(&self, lobby_id: LobbyId) -> Result<ReadyCheckLobby> {
        self.lobbies
            .get(lobby_id)?
            .ok_or_else(|| MatchmakingError::lobby_not_found(lobby_id))
    }

    pub fn open_lobby_for(&self, user_id: &str) -> Result<Option<LobbyId>> {
        self.lobbies.open_lobby_for(user_id)
    }

    pub fn open_count(&self) -> Result<usize> {
        self.lobbies.open_count()
    }

    async fn expire_at(&self, lobby_id: LobbyId, now: DateTime<Utc>) -> Result<ReadyCheckOutcome> {
        let (transition, lobby) = self
            .lobbies
            .transition(lobby_id, &mut |lobby| Ok(lobby.expire(now)))?;

        match transition {
            Transition::Cancelled(reason) => self.handle_cancel(&lobby, reason).await,
            _ => Ok(ReadyCheckOutcome::Unchanged(lobby.status)),
        }
    }

    async fn start_match(
        &self,
        lobby: &ReadyCheckLobby,
        match_id: MatchId,
    ) -> Result<ReadyCheckOutcome> {
        self.metrics.record_ready_check_outcome("converted");
        info!(
            "Ready check {} passed, starting match {}",
            lobby.id, match_id
        );

        let started: Result<Match> = async {
            let mode = self.modes.get_mode(&lobby.game_mode_id)?;
            self.lifecycle
                .create_from_lobby(match_id, lobby.id, &mode, &lobby.player_ids())
                .await
        }
        .await;

        // Everyone accepted, so nobody loses their place over a failed start
        if let Err(e) = started {
            error!(
                "Failed to start match {} for lobby {}: {}",
                match_id, lobby.id, e
            );
            let requeued = self.requeue_accepted(lobby)?;
            warn!(
                "Returned {:?} to the {} queue after failed match start",
                requeued, lobby.game_mode_id
            );
            return Err(e);
        }

        Ok(ReadyCheckOutcome::MatchStarted { match_id })
    }

    async fn handle_cancel(
        &self,
        lobby: &ReadyCheckLobby,
        reason: CancelReason,
    ) -> Result<ReadyCheckOutcome> {
        self.metrics.record_ready_check_outcome(reason.label());

        let requeued = if self.settings.requeue_accepted_on_cancel {
            self.requeue_accepted(lobby)?
        } else {
            Vec::new()
        };

        info!(
            "Ready check {} cancelled ({}), requeued {:?}",
            lobby.id,
            reason.label(),
            requeued
        );

        let event = LobbyEvent::LobbyCancelled(LobbyCancelled {
            lobby_id: lobby.id,
            game_mode_id: lobby.game_mode_id.clone(),
            community_id: lobby.community_id.clone(),
            reason: reason.clone(),
            requeued: requeued.clone(),
            timestamp: current_timestamp(),
        });
        notify_in_background(
            self.notifier.clone(),
            self.metrics.clone(),
            lobby.player_ids(),
            event,
        );

        Ok(ReadyCheckOutcome::Cancelled {
            lobby_id: lobby.id,
            game_mode_id: lobby.game_mode_id.clone(),
            reason,
            requeued,
        })
    }

    /// Put members who accepted back in line with their original join time
    fn requeue_accepted(&self, lobby: &ReadyCheckLobby) -> Result<Vec<UserId>> {
        let mut requeued = Vec::new();
        for member in lobby.members_with(MemberResponse::Accepted) {
            if self
                .queue
                .requeue(member.queue_entry(&lobby.game_mode_id))?
            {
                requeued.push(member.user_id.clone());
            }
        }
        self.metrics
            .record_requeued(&lobby.game_mode_id, requeued.len());
        Ok(requeued)
    }
}
