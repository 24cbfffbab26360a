//! Start and end conditions of a session.

use std::{sync::Arc, time::SystemTime};

use tokio::time::{Instant, sleep_until};
use tracing::{info, warn};

use crate::{
    dao::{
        ledger::SettlementRequest,
        models::{PlayerResultEntity, SessionResultEntity},
    },
    dto::{session::FinishReasonDto, unix_millis},
    error::ServiceError,
    services::{scheduler, session_events, settlement},
    state::{
        SessionHandle, SharedState,
        session::Session,
        state_machine::SessionPhase,
    },
};

/// Start the game when the lobby is ready, otherwise keep the lobby timer in line with the
/// roster: armed once the minimum is reached, cancelled when it drops below.
pub fn evaluate_start(
    state: &SharedState,
    handle: &Arc<SessionHandle>,
    session: &mut Session,
) -> Result<(), ServiceError> {
    let policy = &state.config().lobby;
    if session.ready_to_start(policy.min_players, policy.max_players) {
        return scheduler::begin_game(state, handle, session);
    }
    if session.phase() != SessionPhase::Waiting {
        return Ok(());
    }

    if session.roster_len() < policy.min_players {
        session.timers.cancel_lobby();
    } else if !session.timers.lobby_armed() {
        let deadline = Instant::now() + policy.lobby_timeout;
        info!(
            session_id = %handle.id(),
            players = session.roster_len(),
            timeout_ms = policy.lobby_timeout.as_millis() as u64,
            "minimum roster reached; lobby timer armed"
        );
        let task = tokio::spawn(on_lobby_timeout(state.clone(), handle.clone(), deadline));
        session.timers.set_lobby(task.abort_handle());
    }
    Ok(())
}

async fn on_lobby_timeout(state: SharedState, handle: Arc<SessionHandle>, deadline: Instant) {
    sleep_until(deadline).await;

    let mut session = handle.lock().await;
    if session.is_retired() || session.phase() != SessionPhase::Waiting {
        return;
    }
    session.timers.release_lobby();
    session.mark_lobby_expired();
    info!(session_id = %handle.id(), players = session.roster_len(), "lobby timer elapsed");

    let policy = &state.config().lobby;
    if session.ready_to_start(policy.min_players, policy.max_players)
        && let Err(err) = scheduler::begin_game(&state, &handle, &mut session)
    {
        warn!(session_id = %handle.id(), error = %err, "failed to start game after lobby timeout");
    }
}

/// Report a finish exactly once: publish `game_ended`, hand final scores to the ledger and
/// archive the leaderboard in the background.
pub fn evaluate_end(state: &SharedState, handle: &Arc<SessionHandle>, session: &mut Session) {
    let Some(reason) = session.take_unreported_finish() else {
        return;
    };
    session_events::game_ended(handle, session, reason);

    settlement::settle_session(state, settlement_requests(session));

    let result = session_result(session);
    tokio::spawn(archive_results(state.clone(), handle.clone(), result));
}

async fn archive_results(
    state: SharedState,
    handle: Arc<SessionHandle>,
    result: Option<SessionResultEntity>,
) {
    let archived = match (result, state.result_store().await) {
        (Some(result), Some(store)) => match store.save_result(result).await {
            Ok(()) => true,
            Err(err) => {
                warn!(session_id = %handle.id(), error = %err, "failed to archive final leaderboard");
                false
            }
        },
        (Some(_), None) => {
            warn!(
                session_id = %handle.id(),
                "no result store installed; final leaderboard kept in memory only"
            );
            false
        }
        (None, _) => false,
    };

    let mut session = handle.lock().await;
    if session.is_retired() {
        return;
    }
    session.mark_results_archived(archived);
    session_events::results_archived(&handle, &mut session, archived);
}

/// Archive record of a finished session.
pub fn session_result(session: &Session) -> Option<SessionResultEntity> {
    let SessionPhase::Finished(reason) = session.phase() else {
        return None;
    };
    let finished_at = session.finished_at()?;
    let leaderboard = session
        .leaderboard()
        .into_iter()
        .map(|standing| PlayerResultEntity {
            identifier: standing.identifier,
            rank: standing.rank,
            score: standing.score,
            correct_answers: standing.correct_answers,
            joined_at_ms: unix_millis(standing.joined_at),
        })
        .collect();

    Some(SessionResultEntity {
        session_id: session.id().to_owned(),
        category_id: session.category_id().to_owned(),
        total_rounds: session.rounds().len() as u32,
        finish_reason: FinishReasonDto::from(reason).as_str().to_owned(),
        finished_at_ms: unix_millis(finished_at),
        leaderboard,
    })
}

/// One final-score submission per roster member, departed players included.
fn settlement_requests(session: &Session) -> Vec<SettlementRequest> {
    let finish_time = unix_millis(session.finished_at().unwrap_or_else(SystemTime::now)) / 1_000;
    session
        .players()
        .map(|player| SettlementRequest {
            session_id: session.id().to_owned(),
            player: player.identifier.clone(),
            score: player.score,
            finish_time,
        })
        .collect()
}
