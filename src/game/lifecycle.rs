//! Match lifecycle: team assignment, voice channels, result reports

use crate::error::{MatchmakingError, Result};
use crate::game::instance::Match;
use crate::game::store::MatchStore;
use crate::lobby::provider::GameMode;
use crate::metrics::MetricsCollector;
use crate::notify::{notify_in_background, Notifier, VoiceProvisioner};
use crate::queue::QueueStore;
use crate::types::{LobbyEvent, LobbyId, MatchId, MatchStarted, Team, UserId};
use crate::utils::current_timestamp;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shuffle players uniformly and split them into two teams of `team_size`
pub fn assign_teams(players: &[UserId], team_size: usize) -> (Vec<UserId>, Vec<UserId>) {
    let mut shuffled = players.to_vec();
    shuffled.shuffle(&mut rand::thread_rng());
    let team2 = shuffled.split_off(team_size.min(shuffled.len()));
    (shuffled, team2)
}

/// Creates matches from converted lobbies and records result reports
pub struct MatchLifecycle {
    matches: Arc<dyn MatchStore>,
    queue: Arc<dyn QueueStore>,
    voice: Arc<dyn VoiceProvisioner>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<MetricsCollector>,
}

impl MatchLifecycle {
    pub fn new(
        matches: Arc<dyn MatchStore>,
        queue: Arc<dyn QueueStore>,
        voice: Arc<dyn VoiceProvisioner>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            matches,
            queue,
            voice,
            notifier,
            metrics,
        }
    }

    /// Start a match for every member of a converted lobby.
    ///
    /// Players are removed from every other queue they were still waiting
    /// in. Voice provisioning failures are logged and do not stop the match.
    pub async fn create_from_lobby(
        &self,
        match_id: MatchId,
        lobby_id: LobbyId,
        mode: &GameMode,
        players: &[UserId],
    ) -> Result<Match> {
        if players.len() != mode.required_players() {
            return Err(MatchmakingError::InvalidRequest {
                reason: format!(
                    "Game mode {} needs {} players, got {}",
                    mode.id,
                    mode.required_players(),
                    players.len()
                ),
            });
        }

        let (team1, team2) = assign_teams(players, mode.team_size);
        let game = Match::new(
            match_id,
            lobby_id,
            mode.id.clone(),
            mode.game_id.clone(),
            mode.community_id.clone(),
            &team1,
            &team2,
            current_timestamp(),
        );
        self.matches.insert(game)?;
        self.metrics.record_match_created(&mode.id);

        for user_id in players {
            let removed = self.queue.leave(user_id, None)?;
            if !removed.is_empty() {
                debug!(
                    "Removed {} from {} other queues on match start",
                    user_id,
                    removed.len()
                );
            }
        }

        let mut voice = None;
        if mode.voice_channels {
            match self
                .voice
                .provision_voice(
                    mode.community_id.clone(),
                    match_id,
                    team1.clone(),
                    team2.clone(),
                )
                .await
            {
                Ok(channels) => voice = Some(channels),
                Err(e) => {
                    warn!("Voice provisioning failed for match {}: {}", match_id, e);
                    self.metrics.record_voice_failure();
                }
            }
        }

        let game = match voice.clone() {
            Some(channels) => self.matches.update(match_id, &mut |game| {
                game.voice = Some(channels.clone());
                Ok(())
            })?,
            None => self
                .matches
                .get(match_id)?
                .ok_or_else(|| MatchmakingError::match_not_found(match_id))?,
        };

        info!(
            "Match {} started for lobby {} ({}): {:?} vs {:?}",
            match_id, lobby_id, mode.id, team1, team2
        );

        let event = LobbyEvent::MatchStarted(MatchStarted {
            match_id,
            lobby_id,
            game_mode_id: mode.id.clone(),
            community_id: mode.community_id.clone(),
            team1,
            team2,
            voice,
            timestamp: current_timestamp(),
        });
        notify_in_background(
            self.notifier.clone(),
            self.metrics.clone(),
            players.to_vec(),
            event,
        );

        Ok(game)
    }

    /// Record a participant's score report and move the match to approval
    pub fn report_result(
        &self,
        match_id: MatchId,
        reporter_id: &str,
        team1_score: u32,
        team2_score: u32,
    ) -> Result<Match> {
        let now = current_timestamp();
        let game = self.matches.update(match_id, &mut |game| {
            game.record_report(reporter_id, team1_score, team2_score, now)
        })?;

        info!(
            "Match {} result reported by {}: {} {} - {} {}",
            match_id,
            reporter_id,
            Team::One,
            team1_score,
            team2_score,
            Team::Two
        );
        Ok(game)
    }

    pub fn get_match(&self, match_id: MatchId) -> Result<Match> {
        self.matches
            .get(match_id)?
            .ok_or_else(|| MatchmakingError::match_not_found(match_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::instance::MatchStatus;
    use crate::game::store::InMemoryMatchStore;
    use crate::notify::{LogNotifier, MockNotifier, MockVoiceProvisioner, UnconfiguredVoiceProvisioner};
    use crate::queue::InMemoryQueueStore;
    use crate::types::VoiceChannels;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn players(n: usize) -> Vec<UserId> {
        (0..n).map(|i| format!("player{}", i)).collect()
    }

    fn lifecycle_with(
        queue: Arc<dyn QueueStore>,
        voice: Arc<dyn VoiceProvisioner>,
        notifier: Arc<dyn Notifier>,
    ) -> (MatchLifecycle, Arc<MetricsCollector>) {
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let lifecycle = MatchLifecycle::new(
            Arc::new(InMemoryMatchStore::new()),
            queue,
            voice,
            notifier,
            metrics.clone(),
        );
        (lifecycle, metrics)
    }

    #[test]
    fn test_assign_teams_partitions_players() {
        let players = players(10);
        let (team1, team2) = assign_teams(&players, 5);

        assert_eq!(team1.len(), 5);
        assert_eq!(team2.len(), 5);
        let all: HashSet<_> = team1.iter().chain(team2.iter()).collect();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn test_assign_teams_shuffles() {
        // 1 in 70 chance per draw of keeping the input split; 20 draws all
        // identical would be ~1e-37
        let players = players(8);
        let original: HashSet<_> = players[..4].iter().cloned().collect();
        let varied = (0..20).any(|_| {
            let (team1, _) = assign_teams(&players, 4);
            team1.into_iter().collect::<HashSet<_>>() != original
        });
        assert!(varied);
    }

    #[tokio::test]
    async fn test_create_from_lobby_clears_other_queues() {
        let queue = Arc::new(InMemoryQueueStore::new());
        queue.join("squad", "player0").unwrap();
        queue.join("squad", "outsider").unwrap();

        let (lifecycle, metrics) = lifecycle_with(
            queue.clone(),
            Arc::new(UnconfiguredVoiceProvisioner::new()),
            Arc::new(LogNotifier::new()),
        );
        let mode = GameMode::new("duel", "guild", "chess", "1v1", 1);

        let game = lifecycle
            .create_from_lobby(Uuid::new_v4(), Uuid::new_v4(), &mode, &players(2))
            .await
            .unwrap();

        assert_eq!(game.status, MatchStatus::Ongoing);
        assert_eq!(game.team(Team::One).len(), 1);
        assert_eq!(game.team(Team::Two).len(), 1);
        assert!(queue.queued_modes("player0").unwrap().is_empty());
        assert_eq!(queue.count("squad").unwrap(), 1);
        // Voice not enabled for this mode
        assert_eq!(metrics.matches().voice_failures_total.get(), 0);
    }

    #[tokio::test]
    async fn test_voice_failure_does_not_block_match() {
        let (lifecycle, metrics) = lifecycle_with(
            Arc::new(InMemoryQueueStore::new()),
            Arc::new(UnconfiguredVoiceProvisioner::new()),
            Arc::new(LogNotifier::new()),
        );
        let mode = GameMode::new("duel", "guild", "chess", "1v1", 1).with_voice_channels(true);

        let game = lifecycle
            .create_from_lobby(Uuid::new_v4(), Uuid::new_v4(), &mode, &players(2))
            .await
            .unwrap();

        assert!(game.voice.is_none());
        assert_eq!(metrics.matches().voice_failures_total.get(), 1);
    }

    #[tokio::test]
    async fn test_voice_channels_attached_and_announced() {
        let mut voice = MockVoiceProvisioner::new();
        voice
            .expect_provision_voice()
            .withf(|community, _, team1, team2| {
                community == "guild" && team1.len() == 2 && team2.len() == 2
            })
            .times(1)
            .returning(|_, match_id, _, _| {
                Ok(VoiceChannels {
                    team1_channel: format!("{}-t1", match_id),
                    team2_channel: format!("{}-t2", match_id),
                })
            });

        let (announced_tx, mut announced) = tokio::sync::mpsc::unbounded_channel();
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify_players()
            .withf(|players, event| match event {
                LobbyEvent::MatchStarted(started) => {
                    players.len() == 4 && started.voice.is_some()
                }
                _ => false,
            })
            .times(1)
            .returning(move |_, _| {
                let _ = announced_tx.send(());
                Ok(())
            });

        let (lifecycle, _) = lifecycle_with(
            Arc::new(InMemoryQueueStore::new()),
            Arc::new(voice),
            Arc::new(notifier),
        );
        let mode = GameMode::new("squad", "guild", "cs2", "2v2", 2).with_voice_channels(true);
        let match_id = Uuid::new_v4();

        let game = lifecycle
            .create_from_lobby(match_id, Uuid::new_v4(), &mode, &players(4))
            .await
            .unwrap();

        assert_eq!(
            game.voice.unwrap().team1_channel,
            format!("{}-t1", match_id)
        );
        assert!(lifecycle.get_match(match_id).unwrap().voice.is_some());

        // The announcement is delivered in the background
        let delivered = tokio::time::timeout(std::time::Duration::from_secs(1), announced.recv())
            .await
            .unwrap();
        assert!(delivered.is_some());
    }

    #[tokio::test]
    async fn test_wrong_player_count_rejected() {
        let (lifecycle, _) = lifecycle_with(
            Arc::new(InMemoryQueueStore::new()),
            Arc::new(UnconfiguredVoiceProvisioner::new()),
            Arc::new(LogNotifier::new()),
        );
        let mode = GameMode::new("squad", "guild", "cs2", "2v2", 2);

        let result = lifecycle
            .create_from_lobby(Uuid::new_v4(), Uuid::new_v4(), &mode, &players(3))
            .await;
        assert!(matches!(result, Err(MatchmakingError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn test_report_result() {
        let (lifecycle, _) = lifecycle_with(
            Arc::new(InMemoryQueueStore::new()),
            Arc::new(UnconfiguredVoiceProvisioner::new()),
            Arc::new(LogNotifier::new()),
        );
        let mode = GameMode::new("duel", "guild", "chess", "1v1", 1);
        let match_id = Uuid::new_v4();
        lifecycle
            .create_from_lobby(match_id, Uuid::new_v4(), &mode, &players(2))
            .await
            .unwrap();

        let game = lifecycle.report_result(match_id, "player1", 2, 1).unwrap();
        assert_eq!(game.status, MatchStatus::PendingApproval);

        assert!(matches!(
            lifecycle.report_result(match_id, "stranger", 2, 1),
            Err(MatchmakingError::NotAParticipant { .. })
        ));
        assert!(matches!(
            lifecycle.report_result(Uuid::new_v4(), "player1", 2, 1),
            Err(MatchmakingError::NotFound { .. })
        ));
    }
}
