//! Hand-off of final scores to the settlement ledger.
//!
//! Every player gets its own retry task so one slow or failing write never delays the
//! others. A score the ledger never accepted becomes a pending obligation, kept in memory
//! and mirrored to the result store so operators can list and retry it.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use rand::Rng;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    dao::{
        ledger::{SettlementLedger, SettlementRequest},
        models::SettlementObligationEntity,
        result_store::ResultStore,
    },
    dto::{ops::SettlementRetryReport, unix_millis},
    state::SharedState,
};

/// Spawn one settlement task per request.
pub fn settle_session(state: &SharedState, requests: Vec<SettlementRequest>) {
    for request in requests {
        tokio::spawn(settle_player(state.clone(), request));
    }
}

async fn settle_player(state: SharedState, request: SettlementRequest) {
    let Some(ledger) = state.ledger() else {
        warn!(
            session_id = %request.session_id,
            player = %request.player,
            score = request.score,
            "no settlement ledger configured; score kept as pending obligation"
        );
        record_obligation(&state, &request, 0, "no settlement ledger configured".into()).await;
        return;
    };

    let policy = &state.config().settlement;
    let mut backoff = policy.initial_backoff;
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        match ledger.submit_final_score(request.clone()).await {
            Ok(receipt) => {
                info!(
                    session_id = %request.session_id,
                    player = %request.player,
                    score = request.score,
                    attempt,
                    transaction = receipt.transaction_hash.as_deref().unwrap_or("-"),
                    "final score settled"
                );
                return;
            }
            Err(err) => {
                warn!(
                    session_id = %request.session_id,
                    player = %request.player,
                    attempt,
                    error = %err,
                    "settlement attempt failed"
                );
                last_error = err.to_string();
                if attempt < policy.max_attempts {
                    sleep(with_jitter(backoff)).await;
                    backoff = (backoff * 2).min(policy.max_backoff);
                }
            }
        }
    }

    error!(
        session_id = %request.session_id,
        player = %request.player,
        score = request.score,
        attempts = policy.max_attempts,
        error = %last_error,
        "settlement attempts exhausted; live leaderboard and ledger diverge"
    );
    record_obligation(&state, &request, policy.max_attempts, last_error).await;
}

/// Add up to half of `delay` on top of it.
fn with_jitter(delay: Duration) -> Duration {
    let spread = (delay.as_millis() / 2) as u64;
    let jitter = rand::rng().random_range(0..=spread);
    delay + Duration::from_millis(jitter)
}

async fn record_obligation(
    state: &SharedState,
    request: &SettlementRequest,
    attempts: u32,
    last_error: String,
) {
    let obligation = SettlementObligationEntity {
        session_id: request.session_id.clone(),
        player: request.player.clone(),
        score: request.score,
        finish_time: request.finish_time,
        attempts,
        last_error,
        recorded_at_ms: unix_millis(std::time::SystemTime::now()),
    };
    state
        .pending_settlements()
        .insert(obligation.key(), obligation.clone());
    persist_obligation(state, obligation).await;
}

async fn persist_obligation(state: &SharedState, obligation: SettlementObligationEntity) {
    let Some(store) = state.result_store().await else {
        warn!(
            session_id = %obligation.session_id,
            player = %obligation.player,
            "no result store installed; settlement obligation kept in memory only"
        );
        return;
    };
    let (session_id, player) = (obligation.session_id.clone(), obligation.player.clone());
    if let Err(err) = store.save_obligation(obligation).await {
        warn!(%session_id, %player, error = %err, "failed to persist settlement obligation");
    }
}

async fn clear_obligation(state: &SharedState, obligation: &SettlementObligationEntity) {
    state.pending_settlements().remove(&obligation.key());
    if let Some(store) = state.result_store().await
        && let Err(err) = store
            .delete_obligation(obligation.session_id.clone(), obligation.player.clone())
            .await
    {
        warn!(
            session_id = %obligation.session_id,
            player = %obligation.player,
            error = %err,
            "failed to delete settled obligation"
        );
    }
}

/// Pending obligations, oldest first.
pub fn list_pending(state: &SharedState) -> Vec<SettlementObligationEntity> {
    let mut pending: Vec<_> = state
        .pending_settlements()
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    pending.sort_by_key(|obligation| obligation.recorded_at_ms);
    pending
}

/// Submit every pending obligation once more.
pub async fn retry_pending(state: &SharedState) -> SettlementRetryReport {
    let pending = list_pending(state);
    let Some(ledger) = state.ledger() else {
        warn!(pending = pending.len(), "settlement retry requested without a configured ledger");
        return SettlementRetryReport {
            attempted: 0,
            settled: 0,
            still_pending: pending.len(),
        };
    };

    let attempted = pending.len();
    let outcomes = join_all(
        pending
            .into_iter()
            .map(|obligation| retry_obligation(state, ledger.clone(), obligation)),
    )
    .await;
    let settled = outcomes.into_iter().filter(|settled| *settled).count();

    info!(attempted, settled, "settlement retry finished");
    SettlementRetryReport {
        attempted,
        settled,
        still_pending: state.pending_settlements().len(),
    }
}

async fn retry_obligation(
    state: &SharedState,
    ledger: Arc<dyn SettlementLedger>,
    mut obligation: SettlementObligationEntity,
) -> bool {
    let request = SettlementRequest {
        session_id: obligation.session_id.clone(),
        player: obligation.player.clone(),
        score: obligation.score,
        finish_time: obligation.finish_time,
    };

    match ledger.submit_final_score(request).await {
        Ok(receipt) => {
            info!(
                session_id = %obligation.session_id,
                player = %obligation.player,
                transaction = receipt.transaction_hash.as_deref().unwrap_or("-"),
                "pending settlement accepted"
            );
            clear_obligation(state, &obligation).await;
            true
        }
        Err(err) => {
            obligation.attempts += 1;
            obligation.last_error = err.to_string();
            error!(
                session_id = %obligation.session_id,
                player = %obligation.player,
                attempts = obligation.attempts,
                error = %err,
                "pending settlement still rejected"
            );
            state
                .pending_settlements()
                .insert(obligation.key(), obligation.clone());
            persist_obligation(state, obligation).await;
            false
        }
    }
}

/// Merge obligations persisted by earlier runs with the ones recorded while no store was
/// installed, then write the latter back.
pub async fn restore_obligations(state: &SharedState, store: &Arc<dyn ResultStore>) {
    let stored = match store.list_obligations().await {
        Ok(stored) => stored,
        Err(err) => {
            warn!(error = %err, "failed to load pending settlement obligations");
            return;
        }
    };

    let restored = stored.len();
    let mut stored_keys = Vec::with_capacity(restored);
    for obligation in stored {
        stored_keys.push(obligation.key());
        state
            .pending_settlements()
            .entry(obligation.key())
            .or_insert(obligation);
    }

    let unsaved: Vec<_> = state
        .pending_settlements()
        .iter()
        .filter(|entry| !stored_keys.contains(entry.key()))
        .map(|entry| entry.value().clone())
        .collect();
    let flushed = unsaved.len();
    for obligation in unsaved {
        if let Err(err) = store.save_obligation(obligation).await {
            warn!(error = %err, "failed to persist settlement obligation");
        }
    }

    if restored > 0 || flushed > 0 {
        info!(restored, flushed, "settlement obligations synchronized with storage");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::result_store::memory::MemoryResultStore,
        services::test_support::{RecordingLedger, test_state},
    };

    fn request(player: &str) -> SettlementRequest {
        SettlementRequest {
            session_id: "room-1".into(),
            player: player.into(),
            score: 320,
            finish_time: 1_700_000_000,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_accepted() {
        let ledger = RecordingLedger::failing_first(2);
        let state = test_state(Some(ledger.clone()));

        settle_session(&state, vec![request("alice")]);
        sleep(Duration::from_secs(30)).await;

        assert_eq!(ledger.requests().len(), 3);
        assert!(list_pending(&state).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_become_a_persisted_obligation() {
        let ledger = RecordingLedger::rejecting();
        let state = test_state(Some(ledger.clone()));
        let store = MemoryResultStore::new();
        state.set_result_store(Arc::new(store.clone())).await;

        settle_session(&state, vec![request("alice"), request("bob")]);
        sleep(Duration::from_secs(60)).await;

        let max_attempts = state.config().settlement.max_attempts as usize;
        assert_eq!(ledger.requests().len(), 2 * max_attempts);

        let pending = list_pending(&state);
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|o| o.attempts as usize == max_attempts));
        assert_eq!(store.list_obligations().await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_ledger_records_obligation_without_attempts() {
        let state = test_state(None);
        settle_session(&state, vec![request("alice")]);
        sleep(Duration::from_millis(10)).await;

        let pending = list_pending(&state);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 0);
        assert_eq!(pending[0].score, 320);
    }

    #[tokio::test(start_paused = true)]
    async fn operator_retry_clears_accepted_obligations() {
        let ledger = RecordingLedger::failing_first(5);
        let state = test_state(Some(ledger.clone()));
        let store = MemoryResultStore::new();
        state.set_result_store(Arc::new(store.clone())).await;

        settle_session(&state, vec![request("alice")]);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(list_pending(&state).len(), 1);

        let report = retry_pending(&state).await;
        assert_eq!(
            report,
            SettlementRetryReport {
                attempted: 1,
                settled: 1,
                still_pending: 0
            }
        );
        assert!(store.list_obligations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn restore_merges_stored_and_unsaved_obligations() {
        let state = test_state(None);
        settle_session(&state, vec![request("alice")]);
        tokio::task::yield_now().await;
        while list_pending(&state).is_empty() {
            tokio::task::yield_now().await;
        }

        let store = MemoryResultStore::new();
        store
            .save_obligation(SettlementObligationEntity {
                session_id: "room-0".into(),
                player: "carol".into(),
                score: 90,
                finish_time: 1_600_000_000,
                attempts: 5,
                last_error: "reverted".into(),
                recorded_at_ms: 1,
            })
            .await
            .unwrap();
        let store: Arc<dyn ResultStore> = Arc::new(store);

        restore_obligations(&state, &store).await;

        assert_eq!(list_pending(&state).len(), 2);
        assert_eq!(list_pending(&state)[0].player, "carol");
        assert_eq!(store.list_obligations().await.unwrap().len(), 2);
    }
}
