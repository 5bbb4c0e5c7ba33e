//! Ready-check lobby state machine
//!
//! A lobby is created with a fixed member set once a queue fills. Every member
//! must accept before the deadline. The lobby settles exactly once: into
//! `Converted` when the last member accepts, or into `Cancelled` on the first
//! decline or when the deadline passes with members still pending. Settled
//! lobbies never change again.

use crate::error::{MatchmakingError, Result};
use crate::lobby::provider::GameMode;
use crate::queue::QueueEntry;
use crate::types::{CancelReason, CommunityId, GameModeId, LobbyId, MatchId, UserId};
use crate::utils::{generate_lobby_id, generate_match_id};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A member's answer to the ready check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberResponse {
    Pending,
    Accepted,
    Declined,
    /// Still pending when the deadline passed
    TimedOut,
}

/// One player of a ready-check lobby
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyMember {
    pub user_id: UserId,
    /// Original queue join time, kept for requeueing
    pub joined_queue_at: DateTime<Utc>,
    pub queue_sequence: u64,
    pub response: MemberResponse,
    pub responded_at: Option<DateTime<Utc>>,
}

impl LobbyMember {
    /// Rebuild the queue entry this member was extracted from
    pub fn queue_entry(&self, game_mode_id: &str) -> QueueEntry {
        QueueEntry {
            game_mode_id: game_mode_id.to_string(),
            user_id: self.user_id.clone(),
            joined_at: self.joined_queue_at,
            sequence: self.queue_sequence,
        }
    }
}

/// Lobby status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LobbyStatus {
    /// Waiting for members to respond
    ReadyCheck,
    /// Everyone accepted; the match with this id was started
    Converted { match_id: MatchId },
    /// Declined or timed out
    Cancelled { reason: CancelReason },
}

impl LobbyStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, LobbyStatus::ReadyCheck)
    }

    pub fn label(&self) -> &'static str {
        match self {
            LobbyStatus::ReadyCheck => "ready_check",
            LobbyStatus::Converted { .. } => "converted",
            LobbyStatus::Cancelled { .. } => "cancelled",
        }
    }
}

/// Result of applying an event to a lobby
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Response recorded, lobby still waiting
    Pending { accepted: usize, total: usize },
    /// Last member accepted
    Converted { match_id: MatchId },
    /// Lobby cancelled by this event
    Cancelled(CancelReason),
    /// Event had no effect; carries the current status
    Unchanged(LobbyStatus),
}

/// A ready-check lobby
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyCheckLobby {
    pub id: LobbyId,
    pub game_mode_id: GameModeId,
    pub community_id: CommunityId,
    pub status: LobbyStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub members: Vec<LobbyMember>,
}

impl ReadyCheckLobby {
    /// Create a lobby for the extracted queue entries of a full queue
    pub fn new(
        mode: &GameMode,
        entries: &[QueueEntry],
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Self::with_id(generate_lobby_id(), mode, entries, timeout, now)
    }

    /// Create a lobby with a specific id
    pub fn with_id(
        id: LobbyId,
        mode: &GameMode,
        entries: &[QueueEntry],
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if entries.len() != mode.required_players() {
            return Err(MatchmakingError::InvalidRequest {
                reason: format!(
                    "Game mode {} needs {} players, got {}",
                    mode.id,
                    mode.required_players(),
                    entries.len()
                ),
            });
        }

        let mut seen = HashSet::new();
        if !entries.iter().all(|entry| seen.insert(entry.user_id.as_str())) {
            return Err(MatchmakingError::InvalidRequest {
                reason: "Lobby members must be distinct".to_string(),
            });
        }

        let members = entries
            .iter()
            .map(|entry| LobbyMember {
                user_id: entry.user_id.clone(),
                joined_queue_at: entry.joined_at,
                queue_sequence: entry.sequence,
                response: MemberResponse::Pending,
                responded_at: None,
            })
            .collect();

        Ok(Self {
            id,
            game_mode_id: mode.id.clone(),
            community_id: mode.community_id.clone(),
            status: LobbyStatus::ReadyCheck,
            created_at: now,
            expires_at: now + timeout,
            settled_at: None,
            members,
        })
    }

    pub fn is_settled(&self) -> bool {
        self.status.is_settled()
    }

    pub fn member(&self, user_id: &str) -> Option<&LobbyMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn player_ids(&self) -> Vec<UserId> {
        self.members.iter().map(|m| m.user_id.clone()).collect()
    }

    /// Members with the given response
    pub fn members_with(&self, response: MemberResponse) -> Vec<&LobbyMember> {
        self.members
            .iter()
            .filter(|m| m.response == response)
            .collect()
    }

    pub fn accepted_count(&self) -> usize {
        self.members_with(MemberResponse::Accepted).len()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Record a member's response.
    ///
    /// Checks run in order: membership, duplicate response, then settlement.
    /// A response to a settled lobby is a no-op. A response that arrives
    /// after the deadline settles the lobby as timed out instead.
    pub fn respond(&mut self, user_id: &str, accept: bool, now: DateTime<Utc>) -> Result<Transition> {
        let lobby_id = self.id;
        let member = self
            .members
            .iter()
            .find(|m| m.user_id == user_id)
            .ok_or_else(|| MatchmakingError::NotAParticipant {
                user_id: user_id.to_string(),
                context: format!("lobby {}", lobby_id),
            })?;

        if member.response != MemberResponse::Pending {
            return Err(MatchmakingError::AlreadyResponded {
                user_id: user_id.to_string(),
                lobby_id,
            });
        }

        if self.is_settled() {
            return Ok(Transition::Unchanged(self.status.clone()));
        }

        if self.is_expired(now) {
            return Ok(self.expire(now));
        }

        let response = if accept {
            MemberResponse::Accepted
        } else {
            MemberResponse::Declined
        };
        if let Some(member) = self.members.iter_mut().find(|m| m.user_id == user_id) {
            member.response = response;
            member.responded_at = Some(now);
        }

        if !accept {
            let reason = CancelReason::Declined {
                user_id: user_id.to_string(),
            };
            self.settle(
                LobbyStatus::Cancelled {
                    reason: reason.clone(),
                },
                now,
            );
            return Ok(Transition::Cancelled(reason));
        }

        let accepted = self.accepted_count();
        let total = self.members.len();
        if accepted == total {
            let match_id = generate_match_id();
            self.settle(LobbyStatus::Converted { match_id }, now);
            return Ok(Transition::Converted { match_id });
        }

        Ok(Transition::Pending { accepted, total })
    }

    /// Apply the deadline.
    ///
    /// Only a lobby still in ready check whose deadline has passed changes:
    /// pending members become `TimedOut` and the lobby is cancelled.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Transition {
        if self.is_settled() || !self.is_expired(now) {
            return Transition::Unchanged(self.status.clone());
        }

        let mut non_responders = Vec::new();
        for member in self
            .members
            .iter_mut()
            .filter(|m| m.response == MemberResponse::Pending)
        {
            member.response = MemberResponse::TimedOut;
            non_responders.push(member.user_id.clone());
        }

        let reason = CancelReason::Timeout { non_responders };
        self.settle(
            LobbyStatus::Cancelled {
                reason: reason.clone(),
            },
            now,
        );
        Transition::Cancelled(reason)
    }

    fn settle(&mut self, status: LobbyStatus, now: DateTime<Utc>) {
        self.status = status;
        self.settled_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::current_timestamp;

    fn mode(team_size: usize) -> GameMode {
        GameMode::new("duel", "guild", "chess", "1v1", team_size)
    }

    fn entries(users: &[&str]) -> Vec<QueueEntry> {
        let now = current_timestamp();
        users
            .iter()
            .enumerate()
            .map(|(i, user)| QueueEntry {
                game_mode_id: "duel".to_string(),
                user_id: user.to_string(),
                joined_at: now,
                sequence: i as u64 + 1,
            })
            .collect()
    }

    fn lobby(users: &[&str]) -> ReadyCheckLobby {
        let team_size = users.len() / 2;
        ReadyCheckLobby::new(
            &mode(team_size),
            &entries(users),
            Duration::seconds(60),
            current_timestamp(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_lobby_is_pending() {
        let lobby = lobby(&["a", "b", "c", "d"]);
        assert_eq!(lobby.status, LobbyStatus::ReadyCheck);
        assert_eq!(lobby.members.len(), 4);
        assert_eq!(lobby.members_with(MemberResponse::Pending).len(), 4);
        assert_eq!(lobby.expires_at - lobby.created_at, Duration::seconds(60));
    }

    #[test]
    fn test_member_count_must_match_mode() {
        let result = ReadyCheckLobby::new(
            &mode(2),
            &entries(&["a", "b", "c"]),
            Duration::seconds(60),
            current_timestamp(),
        );
        assert!(matches!(result, Err(MatchmakingError::InvalidRequest { .. })));

        let result = ReadyCheckLobby::new(
            &mode(1),
            &entries(&["a", "a"]),
            Duration::seconds(60),
            current_timestamp(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_all_accept_converts() {
        let mut lobby = lobby(&["a", "b"]);
        let now = current_timestamp();

        assert_eq!(
            lobby.respond("a", true, now).unwrap(),
            Transition::Pending {
                accepted: 1,
                total: 2
            }
        );

        let transition = lobby.respond("b", true, now).unwrap();
        let Transition::Converted { match_id } = transition else {
            panic!("expected conversion, got {:?}", transition);
        };
        assert_eq!(lobby.status, LobbyStatus::Converted { match_id });
        assert!(lobby.settled_at.is_some());
    }

    #[test]
    fn test_decline_cancels_immediately() {
        let mut lobby = lobby(&["a", "b", "c", "d"]);
        let now = current_timestamp();

        lobby.respond("a", true, now).unwrap();
        let transition = lobby.respond("b", false, now).unwrap();

        let reason = CancelReason::Declined {
            user_id: "b".to_string(),
        };
        assert_eq!(transition, Transition::Cancelled(reason.clone()));
        assert_eq!(lobby.status, LobbyStatus::Cancelled { reason });

        // Late responses are no-ops
        assert!(matches!(
            lobby.respond("c", true, now).unwrap(),
            Transition::Unchanged(LobbyStatus::Cancelled { .. })
        ));
        assert_eq!(lobby.member("c").unwrap().response, MemberResponse::Pending);
    }

    #[test]
    fn test_second_response_rejected() {
        let mut lobby = lobby(&["a", "b"]);
        let now = current_timestamp();

        lobby.respond("a", true, now).unwrap();
        let err = lobby.respond("a", false, now).unwrap_err();
        assert!(matches!(err, MatchmakingError::AlreadyResponded { .. }));
        assert_eq!(lobby.member("a").unwrap().response, MemberResponse::Accepted);
        assert_eq!(lobby.status, LobbyStatus::ReadyCheck);
    }

    #[test]
    fn test_outsider_rejected() {
        let mut lobby = lobby(&["a", "b"]);
        let err = lobby.respond("zed", true, current_timestamp()).unwrap_err();
        assert!(matches!(err, MatchmakingError::NotAParticipant { .. }));
    }

    #[test]
    fn test_expire_before_deadline_is_noop() {
        let mut lobby = lobby(&["a", "b"]);
        let transition = lobby.expire(lobby.created_at + Duration::seconds(30));
        assert_eq!(transition, Transition::Unchanged(LobbyStatus::ReadyCheck));
    }

    #[test]
    fn test_expire_marks_non_responders() {
        let mut lobby = lobby(&["a", "b", "c", "d"]);
        lobby.respond("a", true, lobby.created_at).unwrap();
        lobby.respond("c", true, lobby.created_at).unwrap();

        let deadline = lobby.expires_at;
        let transition = lobby.expire(deadline);
        assert_eq!(
            transition,
            Transition::Cancelled(CancelReason::Timeout {
                non_responders: vec!["b".to_string(), "d".to_string()]
            })
        );
        assert_eq!(lobby.members_with(MemberResponse::TimedOut).len(), 2);
        assert_eq!(lobby.accepted_count(), 2);

        // Idempotent
        assert!(matches!(
            lobby.expire(deadline + Duration::seconds(5)),
            Transition::Unchanged(LobbyStatus::Cancelled { .. })
        ));
    }

    #[test]
    fn test_late_response_times_out() {
        let mut lobby = lobby(&["a", "b"]);
        let late = lobby.expires_at + Duration::seconds(1);

        let transition = lobby.respond("a", true, late).unwrap();
        assert!(matches!(
            transition,
            Transition::Cancelled(CancelReason::Timeout { .. })
        ));
        assert_eq!(lobby.member("a").unwrap().response, MemberResponse::TimedOut);
    }

    #[test]
    fn test_member_rebuilds_queue_entry() {
        let entries = entries(&["a", "b"]);
        let lobby =
            ReadyCheckLobby::new(&mode(1), &entries, Duration::seconds(60), current_timestamp())
                .unwrap();
        assert_eq!(lobby.members[1].queue_entry("duel"), entries[1]);
    }
}
