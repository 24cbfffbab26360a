use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod ops;
pub mod results;
pub mod session;
pub mod sse;
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(session::router())
        .merge(sse::router())
        .merge(websocket::router())
        .merge(results::router())
        .merge(ops::router(state.clone()))
        .merge(docs::router());

    api_router.with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
    };
    use axum_valid::Valid;

    use super::*;
    use crate::{dto::session::JoinRequest, services::test_support::test_state};

    #[tokio::test]
    async fn join_then_read_snapshot() {
        let state = test_state(None);
        let Json(joined) = session::join_session(
            State(state.clone()),
            Path("room-1".into()),
            Valid(Json(JoinRequest {
                category_id: "technology".into(),
                player: "0xAbCd".into(),
            })),
        )
        .await
        .unwrap();
        assert_eq!(joined.players[0].identifier, "0xabcd");

        let Json(snapshot) = session::get_snapshot(State(state), Path("room-1".into()))
            .await
            .unwrap();
        assert_eq!(snapshot.last_seq, 1);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let response = session::get_leaderboard(State(test_state(None)), Path("nowhere".into()))
            .await
            .unwrap_err()
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn ops_token_must_match_configuration() {
        assert!(ops::check_ops_token(Some("secret"), Some("secret")).is_ok());
        assert!(ops::check_ops_token(Some("secret"), Some("guess")).is_err());
        assert!(ops::check_ops_token(Some("secret"), None).is_err());
        assert!(ops::check_ops_token(None, Some("secret")).is_err());
    }
}
