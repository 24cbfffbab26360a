use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quiz Arena Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::join_session,
        crate::routes::session::leave_session,
        crate::routes::session::submit_answer,
        crate::routes::session::get_snapshot,
        crate::routes::session::get_leaderboard,
        crate::routes::sse::session_stream,
        crate::routes::results::get_result,
        crate::routes::ops::list_settlements,
        crate::routes::ops::retry_settlements,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::JoinRequest,
            crate::dto::session::SubmitAnswerRequest,
            crate::dto::session::AnswerAccepted,
            crate::dto::session::SessionSnapshot,
            crate::dto::session::LeaderboardResponse,
            crate::dto::events::EventEnvelope,
            crate::dto::events::ResyncRequired,
            crate::dto::ws::PlayerInboundMessage,
            crate::dto::ws::PlayerOutboundMessage,
            crate::dto::results::SessionResultResponse,
            crate::dto::ops::PendingSettlementsResponse,
            crate::dto::ops::SettlementRetryReport,
            crate::error::ErrorBody,
            crate::error::RejectionReason,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Joining, answering and reading live sessions"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "results", description = "Archived final leaderboards"),
        (name = "ops", description = "Operator endpoints guarded by X-Ops-Token"),
        (name = "players", description = "WebSocket operations for players"),
    )
)]
pub struct ApiDoc;
