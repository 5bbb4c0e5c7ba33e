//! Periodic maintenance sweep
//!
//! Deadlines are not timers held in memory: each tick asks the target to
//! expire every lobby whose `expires_at` has passed, re-check capacity for
//! every mode with waiting players, and prune old settled lobbies. A missed
//! tick is caught up by the next one.

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Lobbies cancelled because their deadline passed
    pub expired: usize,
    /// Ready checks opened by capacity re-checks
    pub lobbies_opened: usize,
    /// Settled lobbies removed after the retention window
    pub pruned: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired == 0 && self.lobbies_opened == 0 && self.pruned == 0
    }
}

/// Something that can be swept
#[async_trait]
pub trait SweepTarget: Send + Sync {
    async fn sweep_once(&self) -> Result<SweepReport>;
}

/// Runs [`SweepTarget::sweep_once`] on a fixed interval until shut down
pub struct DeadlineSweeper {
    target: Arc<dyn SweepTarget>,
    interval: Duration,
}

impl DeadlineSweeper {
    pub fn new(target: Arc<dyn SweepTarget>, interval: Duration) -> Self {
        Self { target, interval }
    }

    /// Spawn the sweep loop; it stops when `shutdown` fires or its sender drops
    pub fn spawn(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Deadline sweeper started ({:?} interval)", self.interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => self.tick().await,
                    _ = shutdown.recv() => break,
                }
            }

            info!("Deadline sweeper stopped");
        })
    }

    async fn tick(&self) {
        match self.target.sweep_once().await {
            Ok(report) if report.is_empty() => debug!("Sweep completed, nothing to do"),
            Ok(report) => info!(
                "Sweep completed: {} expired, {} ready checks opened, {} pruned",
                report.expired, report.lobbies_opened, report.pruned
            ),
            Err(e) => warn!("Sweep failed: {}", e),
        }
    }
}
