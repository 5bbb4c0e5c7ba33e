//! Command and query endpoints of the matchmaking API
//!
//! Request and response bodies use camelCase field names.

use crate::game::{Match, VoidOutcome};
use crate::http::error::ApiError;
use crate::http::ApiState;
use crate::lobby::{LobbyStatus, ReadyCheckLobby, ReadyCheckOutcome};
use crate::rating::PlayerRating;
use crate::types::{MatchId, UserId, Winner};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
const MAX_LEADERBOARD_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub community_id: String,
    pub user_id: String,
    /// Game mode id or display name
    pub game_mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub user_id: String,
    pub community_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    pub user_id: String,
    pub accept: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub reporter_id: String,
    pub team1_score: u32,
    pub team2_score: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    /// 0 = draw, 1 = team one, 2 = team two
    pub winner_team: u8,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

/// Generic `{success, message}` reply
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
}

impl CommandResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_accepted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<MatchId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveResponse {
    pub success: bool,
    pub mmr_changes: HashMap<UserId, i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidResponse {
    pub success: bool,
    pub reverted: bool,
    /// `reverted`, `nothing_to_revert` or `reversal_unavailable`
    #[serde(flatten)]
    pub outcome: VoidOutcome,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub game_id: String,
    pub entries: Vec<PlayerRating>,
}

fn parse_id(kind: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid {} id: {}", kind, raw)))
}

/// POST /queue/join
pub async fn join_queue(
    State(state): State<ApiState>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let outcome = state
        .service
        .join(&request.community_id, &request.user_id, &request.game_mode)
        .await?;

    let mode = &outcome.game_mode;
    let message = if outcome.lobbies_opened.is_empty() {
        format!(
            "Joined {} queue ({}/{} players)",
            mode.name,
            outcome.waiting,
            mode.required_players()
        )
    } else {
        format!("Joined {} queue, a ready check has started", mode.name)
    };

    Ok(CommandResponse::ok(message))
}

/// POST /queue/leave
pub async fn leave_queue(
    State(state): State<ApiState>,
    Json(request): Json<LeaveRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let removed = state
        .service
        .leave(&request.user_id, request.community_id.as_deref())?;

    // Leaving without being queued is a no-op
    if removed.is_empty() {
        return Ok(CommandResponse::ok(format!(
            "Player {} is not in any queue",
            request.user_id
        )));
    }

    Ok(CommandResponse::ok(format!(
        "Left {} queue(s)",
        removed.len()
    )))
}

/// POST /ready-checks/{lobbyId}/respond
pub async fn respond_ready_check(
    State(state): State<ApiState>,
    Path(lobby_id): Path<String>,
    Json(request): Json<RespondRequest>,
) -> Result<Json<RespondResponse>, ApiError> {
    let lobby_id = parse_id("lobby", &lobby_id)?;
    let outcome = state
        .service
        .respond(lobby_id, &request.user_id, request.accept)
        .await?;

    let (message, match_id) = match &outcome {
        ReadyCheckOutcome::Pending { accepted, total } => {
            (format!("Accepted ({}/{} ready)", accepted, total), None)
        }
        ReadyCheckOutcome::MatchStarted { match_id } => (
            format!("All players accepted, match {} started", match_id),
            Some(*match_id),
        ),
        ReadyCheckOutcome::Cancelled { reason, .. } => (
            format!("Ready check cancelled ({})", reason.label()),
            None,
        ),
        ReadyCheckOutcome::Unchanged(status) => {
            let match_id = match status {
                LobbyStatus::Converted { match_id } => Some(*match_id),
                _ => None,
            };
            (format!("Ready check already {}", status.label()), match_id)
        }
    };

    Ok(Json(RespondResponse {
        success: true,
        message,
        all_accepted: Some(outcome.all_accepted()),
        match_id,
    }))
}

/// POST /matches/{matchId}/report
pub async fn report_match(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
    Json(request): Json<ReportRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let match_id = parse_id("match", &match_id)?;
    state.service.report_result(
        match_id,
        &request.reporter_id,
        request.team1_score,
        request.team2_score,
    )?;

    Ok(CommandResponse::ok(format!(
        "Result {}-{} recorded, awaiting approval",
        request.team1_score, request.team2_score
    )))
}

/// POST /matches/{matchId}/approve
pub async fn approve_match(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>, ApiError> {
    let match_id = parse_id("match", &match_id)?;
    let winner = Winner::from_code(request.winner_team)
        .ok_or_else(|| ApiError::bad_request("winnerTeam must be 0, 1 or 2"))?;

    let mmr_changes = state.service.approve(match_id, winner)?;
    info!(
        "Match {} approved via API, {} rating changes",
        match_id,
        mmr_changes.len()
    );

    Ok(Json(ApproveResponse {
        success: true,
        mmr_changes,
    }))
}

/// POST /matches/{matchId}/void
pub async fn void_match(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
    body: Bytes,
) -> Result<Json<VoidResponse>, ApiError> {
    let match_id = parse_id("match", &match_id)?;
    // The body is optional; an empty one voids without a reason
    let request: VoidRequest = if body.is_empty() {
        VoidRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid void request: {}", e)))?
    };
    let reason = request
        .reason
        .unwrap_or_else(|| "voided by moderator".to_string());

    let outcome = state.service.void(match_id, &reason)?;
    let message = match &outcome {
        VoidOutcome::NothingToRevert => "Match voided, no ratings had been applied".to_string(),
        VoidOutcome::Reverted { players } => {
            format!("Match voided, ratings reverted for {} players", players)
        }
        VoidOutcome::ReversalUnavailable => format!(
            "Match voided. Rating history missing for match {}, ratings were not reverted",
            match_id
        ),
    };

    Ok(Json(VoidResponse {
        success: true,
        reverted: outcome.reverted(),
        outcome,
        message,
    }))
}

/// GET /lobbies/{lobbyId}
pub async fn get_lobby(
    State(state): State<ApiState>,
    Path(lobby_id): Path<String>,
) -> Result<Json<ReadyCheckLobby>, ApiError> {
    let lobby_id = parse_id("lobby", &lobby_id)?;
    Ok(Json(state.service.get_lobby(lobby_id)?))
}

/// GET /matches/{matchId}
pub async fn get_match(
    State(state): State<ApiState>,
    Path(match_id): Path<String>,
) -> Result<Json<Match>, ApiError> {
    let match_id = parse_id("match", &match_id)?;
    Ok(Json(state.service.get_match(match_id)?))
}

/// GET /leaderboard/{gameId}?limit=
pub async fn leaderboard(
    State(state): State<ApiState>,
    Path(game_id): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_LEADERBOARD_LIMIT);
    debug!("Leaderboard for {} requested (limit {})", game_id, limit);

    let entries = state.service.leaderboard(&game_id, limit)?;
    Ok(Json(LeaderboardResponse { game_id, entries }))
}
