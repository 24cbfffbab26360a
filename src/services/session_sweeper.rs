//! Eviction of finished sessions once their retention period is over.

use std::time::Duration;

use tokio::time::{Instant, interval};
use tracing::info;

use crate::state::SharedState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically drop finished sessions older than the configured retention.
pub async fn run(state: SharedState) {
    let mut ticker = interval(SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        sweep(&state).await;
    }
}

/// Remove every expired session, returning how many were dropped.
pub async fn sweep(state: &SharedState) -> usize {
    let retention = state.config().lobby.retention;
    let now = Instant::now();
    let mut removed = 0;

    for handle in state.registry().handles() {
        let mut session = handle.lock().await;
        if session.expired(now, retention) {
            state.registry().detach(&handle, &mut session);
            info!(session_id = %handle.id(), "finished session evicted from memory");
            removed += 1;
        }
    }
    removed
}
