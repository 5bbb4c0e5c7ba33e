//! Match model
//!
//! A match is created `Ongoing` from a converted lobby. Reporting a score moves
//! it to `PendingApproval`; approval finishes it with a winner. A match can be
//! voided from any state except `Voided`.

use crate::error::{MatchmakingError, Result};
use crate::types::{
    CommunityId, GameId, GameModeId, LobbyId, MatchId, Team, UserId, VoiceChannels, Winner,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Match status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Ongoing,
    PendingApproval,
    Finished,
    Voided,
}

impl MatchStatus {
    /// Whether a result can still be reported or approved
    pub fn is_open(self) -> bool {
        matches!(self, MatchStatus::Ongoing | MatchStatus::PendingApproval)
    }
}

/// A participant and their team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPlayer {
    pub user_id: UserId,
    pub team: Team,
}

/// Score reported by a participant, awaiting approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    pub reporter_id: UserId,
    pub team1_score: u32,
    pub team2_score: u32,
    pub reported_at: DateTime<Utc>,
}

impl MatchReport {
    /// Winner implied by the reported score
    pub fn implied_winner(&self) -> Winner {
        match self.team1_score.cmp(&self.team2_score) {
            std::cmp::Ordering::Greater => Winner::Team(Team::One),
            std::cmp::Ordering::Less => Winner::Team(Team::Two),
            std::cmp::Ordering::Equal => Winner::Draw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub lobby_id: LobbyId,
    pub game_mode_id: GameModeId,
    /// Rating pool the result is applied to
    pub game_id: GameId,
    pub community_id: CommunityId,
    pub status: MatchStatus,
    pub winner: Option<Winner>,
    pub players: Vec<MatchPlayer>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub report: Option<MatchReport>,
    pub voice: Option<VoiceChannels>,
    pub void_reason: Option<String>,
}

impl Match {
    /// Create an ongoing match from two team rosters
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: MatchId,
        lobby_id: LobbyId,
        game_mode_id: GameModeId,
        game_id: GameId,
        community_id: CommunityId,
        team1: &[UserId],
        team2: &[UserId],
        now: DateTime<Utc>,
    ) -> Self {
        let players = team1
            .iter()
            .map(|user_id| (user_id, Team::One))
            .chain(team2.iter().map(|user_id| (user_id, Team::Two)))
            .map(|(user_id, team)| MatchPlayer {
                user_id: user_id.clone(),
                team,
            })
            .collect();

        Self {
            id,
            lobby_id,
            game_mode_id,
            game_id,
            community_id,
            status: MatchStatus::Ongoing,
            winner: None,
            players,
            created_at: now,
            finished_at: None,
            report: None,
            voice: None,
            void_reason: None,
        }
    }

    /// User ids of one team, in roster order
    pub fn team(&self, team: Team) -> Vec<UserId> {
        self.players
            .iter()
            .filter(|p| p.team == team)
            .map(|p| p.user_id.clone())
            .collect()
    }

    pub fn team_of(&self, user_id: &str) -> Option<Team> {
        self.players
            .iter()
            .find(|p| p.user_id == user_id)
            .map(|p| p.team)
    }

    pub fn player_ids(&self) -> Vec<UserId> {
        self.players.iter().map(|p| p.user_id.clone()).collect()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.status {
            MatchStatus::Ongoing | MatchStatus::PendingApproval => Ok(()),
            MatchStatus::Finished | MatchStatus::Voided => {
                Err(MatchmakingError::AlreadyFinished { match_id: self.id })
            }
        }
    }

    /// Record a participant's score report; later reports replace earlier ones
    pub fn record_report(
        &mut self,
        reporter_id: &str,
        team1_score: u32,
        team2_score: u32,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.team_of(reporter_id).is_none() {
            return Err(MatchmakingError::NotAParticipant {
                user_id: reporter_id.to_string(),
                context: format!("match {}", self.id),
            });
        }
        self.ensure_open()?;

        self.report = Some(MatchReport {
            reporter_id: reporter_id.to_string(),
            team1_score,
            team2_score,
            reported_at: now,
        });
        self.status = MatchStatus::PendingApproval;
        Ok(())
    }

    /// Finish with an approved winner
    pub fn finish(&mut self, winner: Winner, now: DateTime<Utc>) -> Result<()> {
        self.ensure_open()?;

        self.status = MatchStatus::Finished;
        self.winner = Some(winner);
        self.finished_at = Some(now);
        Ok(())
    }

    /// Void the match, returning the status it had before
    pub fn void(&mut self, reason: &str) -> Result<MatchStatus> {
        if self.status == MatchStatus::Voided {
            return Err(MatchmakingError::AlreadyVoided { match_id: self.id });
        }

        let previous = self.status;
        self.status = MatchStatus::Voided;
        self.void_reason = Some(reason.to_string());
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::current_timestamp;
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
    fn test_new_match_teams() {
        let m = duel();
        assert_eq!(m.status, MatchStatus::Ongoing);
        assert_eq!(m.team(Team::One), vec!["a"]);
        assert_eq!(m.team(Team::Two), vec!["b"]);
        assert_eq!(m.team_of("b"), Some(Team::Two));
        assert_eq!(m.team_of("z"), None);
    }

    #[test]
    fn test_report_moves_to_pending_approval() {
        let mut m = duel();
        m.record_report("a", 16, 9, current_timestamp()).unwrap();
        assert_eq!(m.status, MatchStatus::PendingApproval);
        assert_eq!(
            m.report.as_ref().unwrap().implied_winner(),
            Winner::Team(Team::One)
        );

        // Later report overwrites
        m.record_report("b", 9, 16, current_timestamp()).unwrap();
        assert_eq!(m.report.as_ref().unwrap().reporter_id, "b");
    }

    #[test]
    fn test_report_rejects_outsiders_and_closed_matches() {
        let mut m = duel();
        assert!(matches!(
            m.record_report("z", 1, 0, current_timestamp()),
            Err(MatchmakingError::NotAParticipant { .. })
        ));

        m.finish(Winner::Draw, current_timestamp()).unwrap();
        assert!(matches!(
            m.record_report("a", 1, 0, current_timestamp()),
            Err(MatchmakingError::AlreadyFinished { .. })
        ));
    }

    #[test]
    fn test_finish_is_guarded() {
        let mut m = duel();
        m.finish(Winner::Team(Team::Two), current_timestamp()).unwrap();
        assert_eq!(m.winner, Some(Winner::Team(Team::Two)));
        assert!(m.finished_at.is_some());

        assert!(matches!(
            m.finish(Winner::Team(Team::One), current_timestamp()),
            Err(MatchmakingError::AlreadyFinished { .. })
        ));
        assert_eq!(m.winner, Some(Winner::Team(Team::Two)));
    }

    #[test]
    fn test_void_returns_previous_status() {
        let mut m = duel();
        m.finish(Winner::Draw, current_timestamp()).unwrap();

        assert_eq!(m.void("cheating").unwrap(), MatchStatus::Finished);
        assert_eq!(m.void_reason.as_deref(), Some("cheating"));
        assert!(matches!(
            m.void("again"),
            Err(MatchmakingError::AlreadyVoided { .. })
        ));
    }
}
