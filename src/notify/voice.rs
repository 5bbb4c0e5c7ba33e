//! Voice channel provisioning

use crate::error::{MatchmakingError, Result};
use crate::notify::VoiceProvisioner;
use crate::types::{MatchId, UserId, VoiceChannels};
use async_trait::async_trait;

/// Default provisioner for deployments without a voice integration.
///
/// Every call fails, so modes with voice channels enabled log a provisioning
/// failure and start their match without channels.
#[derive(Debug, Default)]
pub struct UnconfiguredVoiceProvisioner;

impl UnconfiguredVoiceProvisioner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VoiceProvisioner for UnconfiguredVoiceProvisioner {
    async fn provision_voice(
        &self,
        community_id: String,
        match_id: MatchId,
        _team1: Vec<UserId>,
        _team2: Vec<UserId>,
    ) -> Result<VoiceChannels> {
        Err(MatchmakingError::VoiceProvisioningFailed {
            reason: format!(
                "no voice provider configured for community {} (match {})",
                community_id, match_id
            ),
        })
    }
}
