//! Test fixtures and collaborator doubles for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use rally_point::error::{MatchmakingError, Result};
use rally_point::lobby::{GameMode, StaticGameModeProvider};
use rally_point::metrics::MetricsCollector;
use rally_point::notify::{Notifier, VoiceProvisioner};
use rally_point::service::{MatchmakingService, MatchmakingSettings};
use rally_point::types::{LobbyEvent, MatchId, UserId, VoiceChannels};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const COMMUNITY: &str = "guild";

/// Notifier that captures every announcement for assertions
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Vec<UserId>, LobbyEvent)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(Vec<UserId>, LobbyEvent)> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Number of announcements with the given event name
    pub fn count(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|(_, event)| event.name() == name)
            .count()
    }

    /// Wait for background delivery to reach `expected` announcements of `name`
    pub async fn wait_for(&self, name: &str, expected: usize) -> usize {
        eventually(|| self.count(name) >= expected).await;
        self.count(name)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_players(&self, players: Vec<UserId>, event: LobbyEvent) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("recording notifier"))?
            .push((players, event));
        Ok(())
    }
}

/// Notifier whose every delivery fails
#[derive(Debug, Default)]
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify_players(&self, _players: Vec<UserId>, _event: LobbyEvent) -> Result<()> {
        Err(MatchmakingError::NotificationFailed {
            message: "broker unavailable".to_string(),
        })
    }
}

/// Notifier that holds every delivery far longer than any request may take
#[derive(Debug, Default)]
pub struct StalledNotifier;

#[async_trait]
impl Notifier for StalledNotifier {
    async fn notify_players(&self, _players: Vec<UserId>, _event: LobbyEvent) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

/// Poll `condition` until it holds or two seconds pass; returns the last result
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Voice provisioner that fails the first `failures` calls, then succeeds
#[derive(Debug)]
pub struct FlakyVoiceProvisioner {
    failures: usize,
    calls: AtomicUsize,
}

impl FlakyVoiceProvisioner {
    pub fn new(failures: usize) -> Self {
        Self {
            failures,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceProvisioner for FlakyVoiceProvisioner {
    async fn provision_voice(
        &self,
        _community_id: String,
        match_id: MatchId,
        _team1: Vec<UserId>,
        _team2: Vec<UserId>,
    ) -> Result<VoiceChannels> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(MatchmakingError::VoiceProvisioningFailed {
                reason: format!("attempt {} rejected", call + 1),
            });
        }
        Ok(VoiceChannels {
            team1_channel: format!("{}-team1", match_id),
            team2_channel: format!("{}-team2", match_id),
        })
    }
}

/// Modes used across the integration tests
pub fn game_modes() -> Vec<GameMode> {
    vec![
        GameMode::new("chess-duel", COMMUNITY, "chess", "Duel", 1),
        GameMode::new("cs2-wingman", COMMUNITY, "cs2", "Wingman", 2).with_voice_channels(true),
    ]
}

/// A complete service plus handles on its doubles
pub struct TestSystem {
    pub service: Arc<MatchmakingService>,
    pub notifier: Arc<RecordingNotifier>,
    pub voice: Arc<FlakyVoiceProvisioner>,
    pub metrics: Arc<MetricsCollector>,
}

pub fn test_system() -> TestSystem {
    test_system_with(MatchmakingSettings::default(), 0)
}

pub fn test_system_with(settings: MatchmakingSettings, voice_failures: usize) -> TestSystem {
    let modes = StaticGameModeProvider::new(game_modes()).expect("valid test modes");
    let notifier = Arc::new(RecordingNotifier::new());
    let voice = Arc::new(FlakyVoiceProvisioner::new(voice_failures));
    let metrics = Arc::new(MetricsCollector::new().expect("metrics collector"));

    let service = MatchmakingService::new(
        Arc::new(modes),
        notifier.clone(),
        voice.clone(),
        metrics.clone(),
        settings,
    );

    TestSystem {
        service: Arc::new(service),
        notifier,
        voice,
        metrics,
    }
}

/// Settings with a ready-check timeout short enough to expire in a test
pub fn short_timeout_settings(timeout: Duration) -> MatchmakingSettings {
    let mut settings = MatchmakingSettings::default();
    settings.ready_check.timeout = timeout;
    settings
}
