use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::state_machine::InvalidTransition};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Unknown session, player or archived result.
    #[error("not found: {0}")]
    NotFound(String),
    /// The identifier is already connected to this session.
    #[error("player `{0}` already joined this session")]
    DuplicateIdentifier(String),
    /// Second submission for the same round.
    #[error("player `{player}` already answered round `{round_id}`")]
    AlreadyAnswered { player: String, round_id: String },
    /// Submission for a round that is not the current one.
    #[error("round `{round_id}` is not the current round")]
    StaleRound { round_id: String },
    /// The current round stopped accepting answers.
    #[error("round `{round_id}` is closed")]
    RoundClosed { round_id: String },
    /// The lobby already holds the maximum number of players.
    #[error("session is full ({max} players)")]
    RosterFull { max: usize },
    /// Join names another category than the one the session was created with.
    #[error("session plays category `{expected}`, not `{requested}`")]
    CategoryMismatch { expected: String, requested: String },
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
}

/// Machine-readable reason attached to every rejected client operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Unknown session, player or category.
    NotFound,
    /// The identifier is already in the session.
    DuplicateIdentifier,
    /// The player already answered this round.
    AlreadyAnswered,
    /// The answer names a round other than the current one.
    StaleRound,
    /// The round's deadline passed.
    RoundClosed,
    /// The lobby reached its maximum size.
    RosterFull,
    /// The session exists with another category.
    CategoryMismatch,
    /// Malformed request.
    InvalidInput,
    /// The operation does not fit the session's phase.
    InvalidState,
    /// Missing or wrong operator token.
    Unauthorized,
    /// Storage is unreachable.
    Unavailable,
}

impl ServiceError {
    /// Reason code reported to clients.
    pub fn reason(&self) -> RejectionReason {
        match self {
            ServiceError::NotFound(_) => RejectionReason::NotFound,
            ServiceError::DuplicateIdentifier(_) => RejectionReason::DuplicateIdentifier,
            ServiceError::AlreadyAnswered { .. } => RejectionReason::AlreadyAnswered,
            ServiceError::StaleRound { .. } => RejectionReason::StaleRound,
            ServiceError::RoundClosed { .. } => RejectionReason::RoundClosed,
            ServiceError::RosterFull { .. } => RejectionReason::RosterFull,
            ServiceError::CategoryMismatch { .. } => RejectionReason::CategoryMismatch,
            ServiceError::InvalidInput(_) => RejectionReason::InvalidInput,
            ServiceError::InvalidState(_) => RejectionReason::InvalidState,
            ServiceError::Unauthorized(_) => RejectionReason::Unauthorized,
            ServiceError::Unavailable(_) | ServiceError::Degraded => RejectionReason::Unavailable,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Game rule refused the operation.
    #[error("{message}")]
    Rejected {
        reason: RejectionReason,
        message: String,
    },
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            other => AppError::Rejected {
                reason: other.reason(),
                message: other.to_string(),
            },
        }
    }
}

#[derive(Serialize, ToSchema)]
/// JSON body of every error response.
pub struct ErrorBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<RejectionReason>,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, reason) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, Some(RejectionReason::InvalidInput)),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, Some(RejectionReason::Unauthorized)),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, Some(RejectionReason::NotFound)),
            AppError::Rejected { reason, .. } => {
                let status = match reason {
                    RejectionReason::NotFound => StatusCode::NOT_FOUND,
                    RejectionReason::InvalidInput => StatusCode::BAD_REQUEST,
                    RejectionReason::Unauthorized => StatusCode::UNAUTHORIZED,
                    RejectionReason::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::CONFLICT,
                };
                (status, Some(*reason))
            }
            AppError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, Some(RejectionReason::Unavailable))
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };

        let payload = Json(ErrorBody {
            reason,
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_keep_their_reason_code() {
        let err: AppError = ServiceError::AlreadyAnswered {
            player: "0xabc".into(),
            round_id: "tech-1".into(),
        }
        .into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let err: AppError = ServiceError::NotFound("session `x`".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn reason_codes_are_snake_case() {
        let json = serde_json::to_string(&RejectionReason::DuplicateIdentifier).unwrap();
        assert_eq!(json, "\"duplicate_identifier\"");
        assert_eq!(
            ServiceError::RoundClosed {
                round_id: "r".into()
            }
            .reason(),
            RejectionReason::RoundClosed
        );
    }
}
