//! Matchmaking service facade
//!
//! Wires the stores and coordinators together and exposes the operations the
//! HTTP layer and the sweeper call. Capacity is re-checked here after every
//! event that can fill a queue: a join, and a cancellation that requeued
//! accepted members.

use crate::error::{MatchmakingError, Result};
use crate::game::{
    InMemoryMatchStore, Match, MatchCounts, MatchLifecycle, MatchResolver, MatchStore,
    VoidOutcome,
};
use crate::lobby::{
    GameMode, GameModeProvider, InMemoryLobbyStore, LobbyStore, ReadyCheckCoordinator,
    ReadyCheckLobby, ReadyCheckOutcome, ReadyCheckSettings, SweepReport, SweepTarget,
};
use crate::metrics::MetricsCollector;
use crate::notify::{Notifier, VoiceProvisioner};
use crate::queue::{InMemoryQueueStore, MatchmakingCoordinator, QueueEntry, QueueStore};
use crate::rating::{
    EloEngine, InMemoryRatingStorage, PlayerRating, RatingHistoryEntry, RatingStorage,
    DEFAULT_K_FACTOR,
};
use crate::types::{LobbyId, MatchId, UserId, Winner};
use crate::utils::current_timestamp;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tunables of the matchmaking pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct MatchmakingSettings {
    pub ready_check: ReadyCheckSettings,
    pub initial_rating: i32,
    pub k_factor: f64,
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            ready_check: ReadyCheckSettings::default(),
            initial_rating: 1200,
            k_factor: DEFAULT_K_FACTOR,
        }
    }
}

/// Storage backends used by the service
pub struct Stores {
    pub queue: Arc<dyn QueueStore>,
    pub lobbies: Arc<dyn LobbyStore>,
    pub matches: Arc<dyn MatchStore>,
    pub ratings: Arc<dyn RatingStorage>,
}

impl Stores {
    /// In-memory stores for every concern
    pub fn in_memory(initial_rating: i32) -> Self {
        Self {
            queue: Arc::new(InMemoryQueueStore::new()),
            lobbies: Arc::new(InMemoryLobbyStore::new()),
            matches: Arc::new(InMemoryMatchStore::new()),
            ratings: Arc::new(InMemoryRatingStorage::new(initial_rating)),
        }
    }
}

/// Result of a successful join
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub entry: QueueEntry,
    pub game_mode: GameMode,
    /// Ready checks opened because this join filled the queue
    pub lobbies_opened: Vec<LobbyId>,
    /// Players still waiting for the mode afterward
    pub waiting: usize,
}

/// Point-in-time counts for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchmakingStats {
    pub players_waiting: usize,
    pub active_queues: usize,
    pub open_lobbies: usize,
    pub matches: MatchCounts,
}

/// The matchmaking pipeline behind one handle
pub struct MatchmakingService {
    modes: Arc<dyn GameModeProvider>,
    queue: Arc<dyn QueueStore>,
    matches: Arc<dyn MatchStore>,
    ratings: Arc<dyn RatingStorage>,
    coordinator: MatchmakingCoordinator,
    ready_checks: Arc<ReadyCheckCoordinator>,
    lifecycle: Arc<MatchLifecycle>,
    resolver: MatchResolver,
    metrics: Arc<MetricsCollector>,
}

impl MatchmakingService {
    /// Build a service on in-memory stores
    pub fn new(
        modes: Arc<dyn GameModeProvider>,
        notifier: Arc<dyn Notifier>,
        voice: Arc<dyn VoiceProvisioner>,
        metrics: Arc<MetricsCollector>,
        settings: MatchmakingSettings,
    ) -> Self {
        let stores = Stores::in_memory(settings.initial_rating);
        Self::with_stores(stores, modes, notifier, voice, metrics, settings)
    }

    pub fn with_stores(
        stores: Stores,
        modes: Arc<dyn GameModeProvider>,
        notifier: Arc<dyn Notifier>,
        voice: Arc<dyn VoiceProvisioner>,
        metrics: Arc<MetricsCollector>,
        settings: MatchmakingSettings,
    ) -> Self {
        let lifecycle = Arc::new(MatchLifecycle::new(
            stores.matches.clone(),
            stores.queue.clone(),
            voice,
            notifier.clone(),
            metrics.clone(),
        ));
        let ready_checks = Arc::new(ReadyCheckCoordinator::new(
            stores.lobbies,
            stores.queue.clone(),
            modes.clone(),
            lifecycle.clone(),
            notifier,
            metrics.clone(),
            settings.ready_check,
        ));
        let coordinator = MatchmakingCoordinator::new(
            stores.queue.clone(),
            ready_checks.clone(),
            metrics.clone(),
        );
        let resolver = MatchResolver::new(
            stores.matches.clone(),
            stores.ratings.clone(),
            EloEngine::new(settings.k_factor),
            metrics.clone(),
        );

        Self {
            modes,
            queue: stores.queue,
            matches: stores.matches,
            ratings: stores.ratings,
            coordinator,
            ready_checks,
            lifecycle,
            resolver,
            metrics,
        }
    }

    /// Resolve a mode by id, or by name within the community
    pub fn resolve_mode(&self, community_id: &str, game_mode: &str) -> Result<GameMode> {
        let mode = match self.modes.get_mode(game_mode) {
            Ok(mode) => mode,
            Err(MatchmakingError::UnknownGameMode { .. }) => {
                self.modes.find_by_name(community_id, game_mode)?
            }
            Err(e) => return Err(e),
        };

        if mode.community_id != community_id {
            return Err(MatchmakingError::UnknownGameMode {
                game_mode: game_mode.to_string(),
            });
        }
        Ok(mode)
    }

    /// Queue a player and open ready checks if the queue is now full
    pub async fn join(
        &self,
        community_id: &str,
        user_id: &str,
        game_mode: &str,
    ) -> Result<JoinOutcome> {
        let timer = self.metrics.start_timer();
        let mode = self.resolve_mode(community_id, game_mode)?;

        if let Some(lobby_id) = self.ready_checks.open_lobby_for(user_id)? {
            return Err(MatchmakingError::AlreadyInLobby {
                user_id: user_id.to_string(),
                lobby_id,
            });
        }

        let entry = self.queue.join(&mode.id, user_id)?;
        self.metrics
            .record_queue_join(&mode.id, self.queue.count(&mode.id)?);
        info!("Player {} joined queue {} ({})", user_id, mode.id, mode.name);

        let lobbies_opened = self.fill(&mode).await;
        let waiting = self.queue.count(&mode.id)?;

        self.metrics.record_operation("join", timer.stop());
        Ok(JoinOutcome {
            entry,
            game_mode: mode,
            lobbies_opened,
            waiting,
        })
    }

    /// Remove a player from every queue, or only from one community's queues
    pub fn leave(&self, user_id: &str, community_id: Option<&str>) -> Result<Vec<QueueEntry>> {
        let removed = match community_id {
            None => self.queue.leave(user_id, None)?,
            Some(community_id) => {
                let mut removed = Vec::new();
                for mode in self.modes.modes_for_community(community_id) {
                    removed.extend(self.queue.leave(user_id, Some(&mode.id))?);
                }
                removed
            }
        };

        for entry in &removed {
            self.metrics
                .record_queue_leave(&entry.game_mode_id, self.queue.count(&entry.game_mode_id)?);
        }
        info!("Player {} left {} queue(s)", user_id, removed.len());
        Ok(removed)
    }

    /// Apply a ready-check response
    pub async fn respond(
        &self,
        lobby_id: LobbyId,
        user_id: &str,
        accept: bool,
    ) -> Result<ReadyCheckOutcome> {
        let timer = self.metrics.start_timer();
        let outcome = self.ready_checks.respond(lobby_id, user_id, accept).await?;
        self.after_cancel(&outcome).await;
        self.metrics.record_operation("respond", timer.stop());
        Ok(outcome)
    }

    /// Apply a lobby's deadline now
    pub async fn expire_lobby(&self, lobby_id: LobbyId) -> Result<ReadyCheckOutcome> {
        let outcome = self.ready_checks.on_deadline_expired(lobby_id).await?;
        self.after_cancel(&outcome).await;
        Ok(outcome)
    }

    pub fn report_result(
        &self,
        match_id: MatchId,
        reporter_id: &str,
        team1_score: u32,
        team2_score: u32,
    ) -> Result<Match> {
        self.lifecycle
            .report_result(match_id, reporter_id, team1_score, team2_score)
    }

    /// Approve a result; returns each participant's rating change
    pub fn approve(&self, match_id: MatchId, winner: Winner) -> Result<HashMap<UserId, i32>> {
        self.resolver.approve(match_id, winner)
    }

    pub fn void(&self, match_id: MatchId, reason: &str) -> Result<VoidOutcome> {
        self.resolver.void(match_id, reason)
    }

    pub fn get_lobby(&self, lobby_id: LobbyId) -> Result<ReadyCheckLobby> {
        self.ready_checks.get_lobby(lobby_id)
    }

    /// The open ready check a player is currently part of, if any
    pub fn open_lobby_for(&self, user_id: &str) -> Result<Option<LobbyId>> {
        self.ready_checks.open_lobby_for(user_id)
    }

    pub fn get_match(&self, match_id: MatchId) -> Result<Match> {
        self.lifecycle.get_match(match_id)
    }

    pub fn queue_entries(&self, game_mode_id: &str) -> Result<Vec<QueueEntry>> {
        self.queue.entries(game_mode_id)
    }

    /// A player's rating in a game, at the initial rating if never rated
    pub fn player_rating(&self, user_id: &str, game_id: &str) -> Result<PlayerRating> {
        Ok(self.ratings.get_rating(user_id, game_id)?.unwrap_or_else(|| {
            PlayerRating::new(
                user_id.to_string(),
                game_id.to_string(),
                self.ratings.initial_rating(),
            )
        }))
    }

    pub fn rating_history(&self, user_id: &str, game_id: &str) -> Result<Vec<RatingHistoryEntry>> {
        self.ratings.history_for_player(user_id, game_id)
    }

    pub fn leaderboard(&self, game_id: &str, limit: usize) -> Result<Vec<PlayerRating>> {
        self.ratings.leaderboard(game_id, limit)
    }

    pub fn stats(&self) -> Result<MatchmakingStats> {
        Ok(MatchmakingStats {
            players_waiting: self.queue.total_waiting()?,
            active_queues: self.queue.active_modes()?.len(),
            open_lobbies: self.ready_checks.open_count()?,
            matches: self.matches.counts()?,
        })
    }

    /// Open ready checks for a mode, logging failures instead of returning them
    async fn fill(&self, mode: &GameMode) -> Vec<LobbyId> {
        match self.coordinator.check_capacity(mode).await {
            Ok(lobbies) => lobbies.into_iter().map(|lobby| lobby.id).collect(),
            Err(e) => {
                warn!("Capacity check for {} failed: {}", mode.id, e);
                Vec::new()
            }
        }
    }

    async fn after_cancel(&self, outcome: &ReadyCheckOutcome) {
        if let ReadyCheckOutcome::Cancelled {
            game_mode_id,
            requeued,
            ..
        } = outcome
        {
            if requeued.is_empty() {
                return;
            }
            match self.modes.get_mode(game_mode_id) {
                Ok(mode) => {
                    self.fill(&mode).await;
                }
                Err(e) => debug!("Not re-checking {}: {}", game_mode_id, e),
            }
        }
    }
}

#[async_trait]
impl SweepTarget for MatchmakingService {
    async fn sweep_once(&self) -> Result<SweepReport> {
        let now = current_timestamp();
        let mut report = SweepReport::default();

        let outcomes = self.ready_checks.expire_due(now).await?;
        report.expired = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, ReadyCheckOutcome::Cancelled { .. }))
            .count();

        let modes: BTreeSet<String> = self.queue.active_modes()?.into_iter().collect();
        for game_mode_id in modes {
            match self.modes.get_mode(&game_mode_id) {
                Ok(mode) => report.lobbies_opened += self.fill(&mode).await.len(),
                Err(e) => debug!("Skipping queue {}: {}", game_mode_id, e),
            }
        }

        report.pruned = self.ready_checks.prune_settled(now)?;
        Ok(report)
    }
}
