use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Sessions currently held in memory.
    pub sessions: usize,
    /// Final scores the ledger has not accepted yet.
    pub pending_settlements: usize,
}

impl HealthResponse {
    /// The result store is reachable.
    pub fn ok(sessions: usize, pending_settlements: usize) -> Self {
        Self {
            status: "ok".to_string(),
            sessions,
            pending_settlements,
        }
    }

    /// Live play continues, but finished games cannot be archived.
    pub fn degraded(sessions: usize, pending_settlements: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            sessions,
            pending_settlements,
        }
    }
}
