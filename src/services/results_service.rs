//! Final leaderboards of finished sessions.

use tracing::debug;

use crate::{
    dto::results::SessionResultResponse,
    error::ServiceError,
    services::lifecycle,
    state::SharedState,
};

/// Final leaderboard of `session_id`: from memory while the session is retained, from the
/// result store afterwards.
pub async fn session_result(
    state: &SharedState,
    session_id: &str,
) -> Result<SessionResultResponse, ServiceError> {
    if let Ok(handle) = state.registry().get(session_id) {
        let session = handle.lock().await;
        if let Some(result) = lifecycle::session_result(&session) {
            debug!(session_id, "serving result from live session");
            return Ok(result.into());
        }
        return Err(ServiceError::InvalidState(format!(
            "session `{session_id}` has not finished"
        )));
    }

    let store = state.require_result_store().await?;
    store
        .find_result(session_id.to_owned())
        .await?
        .map(Into::into)
        .ok_or_else(|| ServiceError::NotFound(format!("result of session `{session_id}`")))
}
