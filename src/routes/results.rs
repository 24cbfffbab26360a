use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::results::SessionResultResponse,
    error::{AppError, ErrorBody},
    services::results_service,
    state::SharedState,
};

/// Routes serving archived results.
pub fn router() -> Router<SharedState> {
    Router::new().route("/results/{id}", get(get_result))
}

/// Final leaderboard of a finished session, also after it left memory.
#[utoipa::path(
    get,
    path = "/results/{id}",
    tag = "results",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Archived result", body = SessionResultResponse),
        (status = 404, description = "No result for this session", body = ErrorBody),
        (status = 409, description = "Session still running", body = ErrorBody),
        (status = 503, description = "Result store unavailable", body = ErrorBody)
    )
)]
pub async fn get_result(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResultResponse>, AppError> {
    Ok(Json(results_service::session_result(&state, &id).await?))
}
