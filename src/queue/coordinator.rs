//! Capacity checks: turning a full queue into ready-check lobbies
//!
//! The coordinator reads the waiting list, picks the oldest eligible players
//! and removes exactly those with one conditional extract. If another caller
//! got there first the extract fails as a whole and this attempt stops; the
//! winner has already handled the crossing.

use crate::error::Result;
use crate::lobby::provider::GameMode;
use crate::lobby::{ReadyCheckCoordinator, ReadyCheckLobby};
use crate::metrics::MetricsCollector;
use crate::queue::store::QueueStore;
use crate::types::UserId;
use std::sync::Arc;
use tracing::{debug, info};

pub struct MatchmakingCoordinator {
    queue: Arc<dyn QueueStore>,
    ready_checks: Arc<ReadyCheckCoordinator>,
    metrics: Arc<MetricsCollector>,
}

impl MatchmakingCoordinator {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        ready_checks: Arc<ReadyCheckCoordinator>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            queue,
            ready_checks,
            metrics,
        }
    }

    /// Open as many ready checks as the mode's queue can fill.
    ///
    /// Players already sitting in an open lobby (queued for several modes)
    /// are skipped until that lobby settles. Returns the lobbies created.
    pub async fn check_capacity(&self, mode: &GameMode) -> Result<Vec<ReadyCheckLobby>> {
        let required = mode.required_players();
        let mut created = Vec::new();

        loop {
            let waiting = self.queue.count(&mode.id)?;
            self.metrics.set_players_waiting(&mode.id, waiting);
            if waiting < required {
                break;
            }

            let mut picked: Vec<UserId> = Vec::with_capacity(required);
            for entry in self.queue.peek_oldest(&mode.id, waiting)? {
                if self.ready_checks.open_lobby_for(&entry.user_id)?.is_none() {
                    picked.push(entry.user_id);
                    if picked.len() == required {
                        break;
                    }
                }
            }
            if picked.len() < required {
                debug!(
                    "{} has {} waiting but only {} available for a ready check",
                    mode.id,
                    waiting,
                    picked.len()
                );
                break;
            }

            let entries = match self.queue.extract(&mode.id, &picked) {
                Ok(entries) => entries,
                Err(e) if e.is_retryable() => {
                    debug!("Lost extraction race for {}: {}", mode.id, e);
                    self.metrics.record_extraction_conflict(&mode.id);
                    break;
                }
                Err(e) => return Err(e),
            };

            let lobby = self.ready_checks.create_lobby(mode, entries).await?;
            created.push(lobby);
        }

        if !created.is_empty() {
            info!(
                "Opened {} ready check(s) for {}, {} still waiting",
                created.len(),
                mode.id,
                self.queue.count(&mode.id)?
            );
        }

        Ok(created)
    }
}
