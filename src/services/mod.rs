/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Session start and end conditions.
pub mod lifecycle;
/// Archived results of finished sessions.
pub mod results_service;
/// Round deadlines and transitions.
pub mod scheduler;
/// Builders for published session events.
pub mod session_events;
/// Join, leave, answer and read operations on sessions.
pub mod session_service;
/// Eviction of finished sessions.
pub mod session_sweeper;
/// Final score hand-off to the settlement ledger.
pub mod settlement;
/// Server-Sent Events streaming for spectators.
pub mod sse_service;
/// Storage connection supervisor.
pub mod storage_supervisor;
#[cfg(test)]
pub(crate) mod test_support;
/// WebSocket connection and message handling for players.
pub mod websocket_service;
