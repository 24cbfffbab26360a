use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};

use crate::{
    dto::ops::{PendingSettlementsResponse, SettlementRetryReport},
    error::{AppError, ErrorBody},
    services::settlement,
    state::SharedState,
};

const OPS_TOKEN_HEADER: &str = "x-ops-token";

/// Operator endpoints for settlement obligations.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/ops/settlements", get(list_settlements))
        .route("/ops/settlements/retry", post(retry_settlements))
        .route_layer(middleware::from_fn_with_state(state, require_ops_token))
}

/// List final scores the ledger has not accepted yet.
#[utoipa::path(
    get,
    path = "/ops/settlements",
    tag = "ops",
    params(("X-Ops-Token" = String, Header, description = "Operator token from the configuration")),
    responses(
        (status = 200, description = "Pending obligations, oldest first", body = PendingSettlementsResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    )
)]
pub async fn list_settlements(State(state): State<SharedState>) -> Json<PendingSettlementsResponse> {
    let pending = settlement::list_pending(&state)
        .into_iter()
        .map(Into::into)
        .collect();
    Json(PendingSettlementsResponse { pending })
}

/// Submit every pending obligation to the ledger once more.
#[utoipa::path(
    post,
    path = "/ops/settlements/retry",
    tag = "ops",
    params(("X-Ops-Token" = String, Header, description = "Operator token from the configuration")),
    responses(
        (status = 200, description = "Retry outcome", body = SettlementRetryReport),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    )
)]
pub async fn retry_settlements(State(state): State<SharedState>) -> Json<SettlementRetryReport> {
    Json(settlement::retry_pending(&state).await)
}

async fn require_ops_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(OPS_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    check_ops_token(state.config().ops_token.as_deref(), provided)?;
    Ok(next.run(req).await)
}

pub(crate) fn check_ops_token(expected: Option<&str>, provided: Option<&str>) -> Result<(), AppError> {
    let provided = provided.ok_or_else(|| {
        AppError::Unauthorized("missing operator token header `X-Ops-Token`".into())
    })?;
    match expected {
        Some(token) if token == provided => Ok(()),
        Some(_) => Err(AppError::Unauthorized("invalid operator token".into())),
        None => Err(AppError::Unauthorized(
            "operator endpoints are disabled; no token configured".into(),
        )),
    }
}
