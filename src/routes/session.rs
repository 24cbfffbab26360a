use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use axum_valid::Valid;

use crate::{
    dto::session::{
        AnswerAccepted, JoinRequest, LeaderboardResponse, SessionSnapshot, SubmitAnswerRequest,
    },
    error::{AppError, ErrorBody},
    services::session_service,
    state::SharedState,
};

/// Player-facing session operations over plain HTTP.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}", get(get_snapshot))
        .route("/sessions/{id}/players", post(join_session))
        .route("/sessions/{id}/players/{player}", delete(leave_session))
        .route("/sessions/{id}/answers", post(submit_answer))
        .route("/sessions/{id}/leaderboard", get(get_leaderboard))
}

/// Join a session, creating it on first use.
#[utoipa::path(
    post,
    path = "/sessions/{id}/players",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Joined; current session state", body = SessionSnapshot),
        (status = 400, description = "Invalid identifier", body = ErrorBody),
        (status = 404, description = "Unknown category", body = ErrorBody),
        (status = 409, description = "Join refused", body = ErrorBody)
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let snapshot =
        session_service::join(&state, &id, &payload.category_id, &payload.player).await?;
    Ok(Json(snapshot))
}

/// Leave a lobby, or depart from a running game keeping the score earned so far.
#[utoipa::path(
    delete,
    path = "/sessions/{id}/players/{player}",
    tag = "sessions",
    params(
        ("id" = String, Path, description = "Session identifier"),
        ("player" = String, Path, description = "Player identifier")
    ),
    responses(
        (status = 204, description = "Player left"),
        (status = 404, description = "Unknown session or player", body = ErrorBody)
    )
)]
pub async fn leave_session(
    State(state): State<SharedState>,
    Path((id, player)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    session_service::leave(&state, &id, &player).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Submit an answer for the current round.
#[utoipa::path(
    post,
    path = "/sessions/{id}/answers",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer accepted", body = AnswerAccepted),
        (status = 400, description = "Invalid option", body = ErrorBody),
        (status = 409, description = "Stale round, closed round or duplicate answer", body = ErrorBody)
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Valid(Json(payload)): Valid<Json<SubmitAnswerRequest>>,
) -> Result<Json<AnswerAccepted>, AppError> {
    let accepted = session_service::submit_answer(
        &state,
        &id,
        &payload.player,
        &payload.round_id,
        payload.selected_option_index,
        payload.elapsed_ms,
    )
    .await?;
    Ok(Json(accepted))
}

/// Point-in-time view of a live session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session snapshot", body = SessionSnapshot),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn get_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::snapshot(&state, &id).await?))
}

/// Current ordering of a live session's players.
#[utoipa::path(
    get,
    path = "/sessions/{id}/leaderboard",
    tag = "sessions",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Leaderboard", body = LeaderboardResponse),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    Ok(Json(session_service::leaderboard(&state, &id).await?))
}
