//! Mapping of matchmaking errors onto HTTP responses

use crate::error::MatchmakingError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Error returned by API handlers, rendered as `{success: false, message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<MatchmakingError> for ApiError {
    fn from(err: MatchmakingError) -> Self {
        let status = match &err {
            MatchmakingError::AlreadyQueued { .. }
            | MatchmakingError::AlreadyInLobby { .. }
            | MatchmakingError::StaleExtraction { .. }
            | MatchmakingError::AlreadyResponded { .. }
            | MatchmakingError::AlreadyFinished { .. }
            | MatchmakingError::AlreadyVoided { .. }
            | MatchmakingError::RatingReversalUnavailable { .. } => StatusCode::CONFLICT,
            MatchmakingError::NotFound { .. } | MatchmakingError::UnknownGameMode { .. } => {
                StatusCode::NOT_FOUND
            }
            MatchmakingError::NotAParticipant { .. } | MatchmakingError::InvalidRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            MatchmakingError::VoiceProvisioningFailed { .. }
            | MatchmakingError::NotificationFailed { .. }
            | MatchmakingError::ConfigurationError { .. }
            | MatchmakingError::InternalError { .. } => {
                error!("Request failed with internal error: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let conflict: ApiError = MatchmakingError::AlreadyResponded {
            user_id: "alice".to_string(),
            lobby_id: Uuid::new_v4(),
        }
        .into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let missing: ApiError = MatchmakingError::match_not_found(Uuid::new_v4()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let invalid: ApiError = MatchmakingError::InvalidRequest {
            reason: "winnerTeam must be 0, 1 or 2".to_string(),
        }
        .into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.message(), "Invalid request: winnerTeam must be 0, 1 or 2");

        let internal: ApiError = MatchmakingError::lock_poisoned("queue").into();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
