use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness plus the storage status, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_result_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "result store health check failed");
            }
        }
        Err(_) => warn!("result store unavailable (degraded mode)"),
    }

    let sessions = state.registry().len();
    let pending_settlements = state.pending_settlements().len();
    if state.is_degraded().await {
        HealthResponse::degraded(sessions, pending_settlements)
    } else {
        HealthResponse::ok(sessions, pending_settlements)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{dao::result_store::memory::MemoryResultStore, services::test_support::test_state};

    #[tokio::test]
    async fn degraded_until_a_store_is_installed() {
        let state = test_state(None);
        assert_eq!(health_status(&state).await.status, "degraded");

        state.set_result_store(Arc::new(MemoryResultStore::new())).await;
        let health = health_status(&state).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.sessions, 0);
    }
}
