//! Round timing: game start, deadline driver and round conclusion.
//!
//! Each running session owns one driver task that sleeps until the current round's
//! deadline. Early closes (everyone answered) go through [`conclude_round`] directly; the
//! driver notices the round moved on when it wakes up and goes back to sleep.

use std::{sync::Arc, time::SystemTime};

use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info};

use crate::{
    error::ServiceError,
    services::{lifecycle, session_events},
    state::{
        SessionHandle, SharedState,
        session::{Progress, Session},
        state_machine::SessionPhase,
    },
};

/// Move a waiting session to its first round and start its deadline driver.
pub fn begin_game(
    state: &SharedState,
    handle: &Arc<SessionHandle>,
    session: &mut Session,
) -> Result<(), ServiceError> {
    session.timers.cancel_lobby();
    session.start(Instant::now(), SystemTime::now())?;
    info!(
        session_id = %handle.id(),
        players = session.roster_len(),
        rounds = session.rounds().len(),
        "game started"
    );

    session_events::game_started(handle, session);
    session_events::round_started(handle, session);

    let task = tokio::spawn(drive_rounds(state.clone(), handle.clone()));
    session.timers.set_round(task.abort_handle());
    Ok(())
}

/// Close every round whose deadline passes, until the session leaves `ACTIVE`.
async fn drive_rounds(state: SharedState, handle: Arc<SessionHandle>) {
    loop {
        let (round_index, deadline) = {
            let session = handle.lock().await;
            if session.is_retired() || session.phase() != SessionPhase::Active {
                return;
            }
            let Some(deadline) = session.round_deadline() else {
                return;
            };
            (session.current_round_index(), deadline)
        };

        sleep_until(deadline).await;

        let mut session = handle.lock().await;
        if session.is_retired() {
            return;
        }
        if session.current_round_index() != round_index {
            // Closed early by the last answer; wait for the next deadline.
            continue;
        }
        debug!(session_id = %handle.id(), round_index, "round deadline reached");
        conclude_round(&state, &handle, &mut session);
    }
}

/// Close the current round and move on. Safe to call from both close triggers: only the
/// first call for a given round has any effect.
pub fn conclude_round(state: &SharedState, handle: &Arc<SessionHandle>, session: &mut Session) {
    let Some(outcome) = session.close_round() else {
        return;
    };

    let timed_out = outcome.awards.iter().filter(|award| award.timed_out).count();
    info!(
        session_id = %handle.id(),
        round_id = %outcome.round_id,
        round_index = outcome.round_index,
        timed_out,
        "round closed"
    );
    session_events::round_ended(handle, session, outcome);

    match session.advance(Instant::now(), SystemTime::now()) {
        Ok(Progress::RoundStarted(index)) => {
            debug!(session_id = %handle.id(), round_index = index, "next round opened");
            session_events::round_started(handle, session);
        }
        Ok(Progress::Finished(reason)) => {
            info!(session_id = %handle.id(), ?reason, "game finished");
            lifecycle::evaluate_end(state, handle, session);
        }
        Err(err) => {
            error!(session_id = %handle.id(), error = %err, "failed to advance session");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::{
        dto::events::SessionEvent,
        services::test_support::{session_with_players, test_state},
    };

    #[tokio::test(start_paused = true)]
    async fn deadline_closes_round_and_synthesizes_missing_answers() {
        let state = test_state(None);
        let handle = session_with_players(&state, "room-1", &["alice", "bob", "carol"]).await;
        let mut events = {
            let mut session = handle.lock().await;
            let events = handle.subscribe(&session);
            begin_game(&state, &handle, &mut session).unwrap();
            let round_id = session.current_round().unwrap().id.clone();
            session
                .submit_answer(
                    "alice",
                    &round_id,
                    Some(0),
                    1_000,
                    Duration::ZERO,
                    Instant::now(),
                )
                .unwrap();
            events
        };

        assert_eq!(events.recv().await.unwrap().event.name(), "game_started");
        assert_eq!(events.recv().await.unwrap().event.name(), "round_started");

        tokio::time::sleep(Duration::from_secs(31)).await;

        let ended = events.recv().await.unwrap();
        let SessionEvent::RoundEnded(payload) = ended.event else {
            panic!("expected round_ended, got {}", ended.event.name());
        };
        assert_eq!(payload.scores.len(), 3);
        assert_eq!(payload.scores.iter().filter(|s| s.timed_out).count(), 2);
        assert_eq!(events.recv().await.unwrap().event.name(), "round_started");

        let session = handle.lock().await;
        assert_eq!(session.current_round_index(), 1);
        for player in session.players() {
            assert_eq!(player.answers.len(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_close_trigger_is_a_no_op() {
        let state = test_state(None);
        let handle = session_with_players(&state, "room-2", &["alice", "bob"]).await;
        let mut session = handle.lock().await;
        let mut events = handle.subscribe(&session);
        begin_game(&state, &handle, &mut session).unwrap();

        conclude_round(&state, &handle, &mut session);
        let after_first = session.last_seq();
        // The driver woke up for the same round after it was already closed.
        assert!(session.close_round().is_none());
        assert_eq!(session.last_seq(), after_first);
        assert_eq!(session.current_round_index(), 1);
        drop(session);

        let names: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|envelope| envelope.event.name())
            .collect();
        assert_eq!(
            names,
            ["game_started", "round_started", "round_ended", "round_started"]
        );
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn game_runs_to_completion_on_deadlines_alone() {
        let state = test_state(None);
        let handle = session_with_players(&state, "room-3", &["alice", "bob"]).await;
        let total_rounds = {
            let mut session = handle.lock().await;
            begin_game(&state, &handle, &mut session).unwrap();
            session.rounds().len()
        };

        tokio::time::sleep(Duration::from_secs(31 * total_rounds as u64)).await;

        let session = handle.lock().await;
        assert!(matches!(session.phase(), SessionPhase::Finished(_)));
        assert_eq!(session.current_round_index(), total_rounds as i64);
        for player in session.players() {
            assert_eq!(player.answers.len(), total_rounds);
            assert_eq!(player.score, 0);
        }
    }
}
