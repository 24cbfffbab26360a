//! Boundary operations on sessions, shared by the REST, WebSocket and SSE transports.

use std::{sync::Arc, time::SystemTime};

use tokio::{sync::broadcast, time::Instant};
use tracing::{debug, info};

use crate::{
    dto::{
        events::EventEnvelope,
        session::{AnswerAccepted, LeaderboardResponse, SessionSnapshot},
        validation::{normalize_identifier, validate_identifier},
    },
    error::ServiceError,
    services::{lifecycle, scheduler, session_events},
    state::{
        SessionHandle, SharedState,
        round::Round,
        session::Session,
        state_machine::SessionPhase,
    },
};

/// Player accepted into a session.
pub struct Joined {
    /// Normalized identifier the session knows the player by.
    pub player: String,
    /// Generation of this membership; pass it to [`leave_connection`].
    pub connection: u64,
    pub snapshot: SessionSnapshot,
    /// Present when the caller asked for a subscription; contiguous with `snapshot`.
    pub events: Option<broadcast::Receiver<EventEnvelope>>,
}

/// Join (creating the session on first use) and return a snapshot.
pub async fn join(
    state: &SharedState,
    session_id: &str,
    category_id: &str,
    player: &str,
) -> Result<SessionSnapshot, ServiceError> {
    join_session(state, session_id, category_id, player, false)
        .await
        .map(|joined| joined.snapshot)
}

/// Join and subscribe to the session's events in one step.
pub async fn join_and_subscribe(
    state: &SharedState,
    session_id: &str,
    category_id: &str,
    player: &str,
) -> Result<Joined, ServiceError> {
    join_session(state, session_id, category_id, player, true).await
}

async fn join_session(
    state: &SharedState,
    session_id: &str,
    category_id: &str,
    player: &str,
    subscribe: bool,
) -> Result<Joined, ServiceError> {
    check_identifier("session id", session_id)?;
    check_identifier("player", player)?;
    let player = normalize_identifier(player);
    let max_players = state.config().lobby.max_players;

    loop {
        let (handle, created) = state
            .registry()
            .get_or_create(session_id, || new_session(state, session_id, category_id))?;
        let mut session = handle.lock().await;
        if session.is_retired() {
            // Lost a race with idle-lobby cleanup; the next lookup creates a fresh session.
            continue;
        }
        if created {
            info!(session_id, category_id, "session created");
        }
        if session.category_id() != category_id {
            return Err(ServiceError::CategoryMismatch {
                expected: session.category_id().to_owned(),
                requested: category_id.to_owned(),
            });
        }

        let outcome = session.add_player(&player, max_players, SystemTime::now())?;
        info!(
            session_id,
            player = %player,
            ?outcome,
            roster = session.roster_len(),
            "player joined"
        );
        session_events::player_joined(&handle, &mut session, &player, outcome);
        lifecycle::evaluate_start(state, &handle, &mut session)?;

        let connection = session.connection_of(&player).unwrap_or_default();
        let events = subscribe.then(|| handle.subscribe(&session));
        let snapshot = SessionSnapshot::new(&session, Instant::now());
        return Ok(Joined {
            player,
            connection,
            snapshot,
            events,
        });
    }
}

fn new_session(
    state: &SharedState,
    session_id: &str,
    category_id: &str,
) -> Result<Session, ServiceError> {
    let rounds: Vec<Round> = state
        .questions()
        .questions(category_id)
        .ok_or_else(|| ServiceError::NotFound(format!("category `{category_id}`")))?
        .into_iter()
        .map(Round::from)
        .collect();
    Session::new(session_id, category_id, rounds)
}

fn check_identifier(label: &str, value: &str) -> Result<(), ServiceError> {
    validate_identifier(value.trim()).map_err(|err| {
        ServiceError::InvalidInput(format!(
            "{label}: {}",
            err.message.unwrap_or_else(|| err.code.clone())
        ))
    })
}

/// Remove a player from the lobby, or mark it departed once the game runs.
pub async fn leave(
    state: &SharedState,
    session_id: &str,
    player: &str,
) -> Result<(), ServiceError> {
    depart(state, session_id, player, None).await
}

/// Leave on behalf of the connection that joined as `connection`. A player that rejoined
/// since then is left alone and `NotFound` is returned.
pub async fn leave_connection(
    state: &SharedState,
    session_id: &str,
    player: &str,
    connection: u64,
) -> Result<(), ServiceError> {
    depart(state, session_id, player, Some(connection)).await
}

async fn depart(
    state: &SharedState,
    session_id: &str,
    player: &str,
    connection: Option<u64>,
) -> Result<(), ServiceError> {
    let player = normalize_identifier(player);
    let handle = live_handle(state, session_id)?;
    let mut session = handle.lock().await;
    if session.is_retired() {
        return Err(ServiceError::NotFound(format!("session `{session_id}`")));
    }

    let outcome = match connection {
        Some(connection) => session.remove_connection(&player, connection)?,
        None => session.remove_player(&player)?,
    };
    info!(session_id, player = %player, ?outcome, "player left");
    session_events::player_left(&handle, &mut session, &player, outcome);

    match session.phase() {
        SessionPhase::Waiting if session.is_idle() => {
            state.registry().detach(&handle, &mut session);
            info!(session_id, "idle lobby removed");
        }
        SessionPhase::Waiting => lifecycle::evaluate_start(state, &handle, &mut session)?,
        SessionPhase::Active => {
            if session.round_complete() {
                scheduler::conclude_round(state, &handle, &mut session);
            }
        }
        SessionPhase::Finished(_) => {}
    }
    Ok(())
}

/// Score a submission server-side. The awarded points are revealed by `round_ended`.
pub async fn submit_answer(
    state: &SharedState,
    session_id: &str,
    player: &str,
    round_id: &str,
    selected_option_index: Option<usize>,
    client_elapsed_ms: u64,
) -> Result<AnswerAccepted, ServiceError> {
    let player = normalize_identifier(player);
    let handle = live_handle(state, session_id)?;
    let mut session = handle.lock().await;
    if session.is_retired() {
        return Err(ServiceError::NotFound(format!("session `{session_id}`")));
    }

    let receipt = session
        .submit_answer(
            &player,
            round_id,
            selected_option_index,
            client_elapsed_ms,
            state.config().lobby.latency_allowance,
            Instant::now(),
        )
        .inspect_err(|err| {
            debug!(session_id, player = %player, round_id, error = %err, "answer rejected");
        })?;
    debug!(
        session_id,
        player = %player,
        round_id,
        elapsed_ms = receipt.elapsed_ms,
        "answer accepted"
    );
    session_events::answer_received(&handle, &mut session, &player, &receipt.round_id);

    if session.round_complete() {
        scheduler::conclude_round(state, &handle, &mut session);
    }

    Ok(AnswerAccepted {
        session_id: session_id.to_owned(),
        player,
        round_id: receipt.round_id,
        elapsed_ms: receipt.elapsed_ms,
    })
}

pub async fn snapshot(state: &SharedState, session_id: &str) -> Result<SessionSnapshot, ServiceError> {
    let handle = live_handle(state, session_id)?;
    let session = handle.lock().await;
    Ok(SessionSnapshot::new(&session, Instant::now()))
}

pub async fn leaderboard(
    state: &SharedState,
    session_id: &str,
) -> Result<LeaderboardResponse, ServiceError> {
    let handle = live_handle(state, session_id)?;
    let session = handle.lock().await;
    Ok(LeaderboardResponse::new(&session))
}

/// Spectator subscription: snapshot plus the events that follow it.
pub async fn subscribe(
    state: &SharedState,
    session_id: &str,
) -> Result<(SessionSnapshot, broadcast::Receiver<EventEnvelope>), ServiceError> {
    let handle = live_handle(state, session_id)?;
    let session = handle.lock().await;
    let events = handle.subscribe(&session);
    Ok((SessionSnapshot::new(&session, Instant::now()), events))
}

fn live_handle(state: &SharedState, session_id: &str) -> Result<Arc<SessionHandle>, ServiceError> {
    state.registry().get(session_id)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::join_all;

    use super::*;
    use crate::{
        config::AppConfig,
        dto::{events::SessionEvent, session::SessionStateDto},
        services::test_support::{CATEGORY, test_state, test_state_with},
    };

    fn two_player_lobby() -> SharedState {
        let mut config = AppConfig::default();
        config.lobby.min_players = 2;
        config.lobby.max_players = 2;
        test_state_with(config, None)
    }

    fn drain(events: &mut broadcast::Receiver<EventEnvelope>) -> Vec<SessionEvent> {
        std::iter::from_fn(|| events.try_recv().ok())
            .map(|envelope| envelope.event)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn second_join_starts_the_game_exactly_once() {
        let state = two_player_lobby();
        let first = join_and_subscribe(&state, "room-d", CATEGORY, "alice")
            .await
            .unwrap();
        let mut events = first.events.unwrap();
        assert_eq!(first.snapshot.state, SessionStateDto::Waiting);

        let snapshot = join(&state, "room-d", CATEGORY, "bob").await.unwrap();
        assert_eq!(snapshot.state, SessionStateDto::Active);
        assert_eq!(snapshot.current_round_index, 0);

        let started = drain(&mut events)
            .into_iter()
            .filter(|event| matches!(event, SessionEvent::GameStarted(_)))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn concurrent_first_joins_share_one_session() {
        let state = test_state(None);
        let players: Vec<String> = (0..8).map(|i| format!("player-{i}")).collect();
        let results = join_all(
            players
                .iter()
                .map(|player| join(&state, "room-c", CATEGORY, player)),
        )
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(state.registry().len(), 1);
        let snapshot = snapshot(&state, "room-c").await.unwrap();
        assert_eq!(snapshot.players.len(), 8);
    }

    #[tokio::test]
    async fn join_rejections_carry_their_reason() {
        let state = test_state(None);
        join(&state, "room-r", CATEGORY, "0xAbC1").await.unwrap();

        let duplicate = join(&state, "room-r", CATEGORY, "0xabc1").await;
        assert!(matches!(duplicate, Err(ServiceError::DuplicateIdentifier(_))));

        let mismatch = join(&state, "room-r", "science", "bob").await;
        assert!(matches!(mismatch, Err(ServiceError::CategoryMismatch { .. })));

        let unknown = join(&state, "room-u", "cooking", "bob").await;
        assert!(matches!(unknown, Err(ServiceError::NotFound(_))));
        assert!(state.registry().get("room-u").is_err());

        let invalid = join(&state, "room-r", CATEGORY, "a b").await;
        assert!(matches!(invalid, Err(ServiceError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn full_lobby_refuses_more_players() {
        let mut config = AppConfig::default();
        config.lobby.min_players = 3;
        config.lobby.max_players = 3;
        let state = test_state_with(config, None);
        for player in ["alice", "bob", "carol"] {
            join(&state, "room-f", CATEGORY, player).await.unwrap();
        }
        // The third join started the game; newcomers are turned away.
        let late = join(&state, "room-f", CATEGORY, "dave").await;
        assert!(matches!(late, Err(ServiceError::InvalidState(_))));
    }

    #[tokio::test]
    async fn last_player_leaving_a_lobby_removes_the_session() {
        let state = test_state(None);
        join(&state, "room-l", CATEGORY, "alice").await.unwrap();
        leave(&state, "room-l", "alice").await.unwrap();
        assert!(state.registry().is_empty());

        // The identifier is free again and a fresh session is created.
        let snapshot = join(&state, "room-l", CATEGORY, "alice").await.unwrap();
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.last_seq, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn answers_close_round_early_and_points_match_scoring() {
        let state = two_player_lobby();
        let joined = join_and_subscribe(&state, "room-a", CATEGORY, "alice")
            .await
            .unwrap();
        let mut events = joined.events.unwrap();
        join(&state, "room-a", CATEGORY, "bob").await.unwrap();

        let accepted = submit_answer(&state, "room-a", "alice", "t1", Some(0), 0)
            .await
            .unwrap();
        assert_eq!(accepted.elapsed_ms, 0);
        let again = submit_answer(&state, "room-a", "alice", "t1", Some(1), 0).await;
        assert!(matches!(again, Err(ServiceError::AlreadyAnswered { .. })));

        submit_answer(&state, "room-a", "bob", "t1", Some(2), 5_000)
            .await
            .unwrap();

        let stale = submit_answer(&state, "room-a", "bob", "t1", Some(0), 0).await;
        assert!(matches!(stale, Err(ServiceError::StaleRound { .. })));

        let ended = drain(&mut events)
            .into_iter()
            .find_map(|event| match event {
                SessionEvent::RoundEnded(payload) => Some(payload),
                _ => None,
            })
            .unwrap();
        assert_eq!(ended.round_id, "t1");
        let points: Vec<_> = ended.scores.iter().map(|s| (s.player.as_str(), s.awarded_score)).collect();
        assert_eq!(points, [("alice", 200), ("bob", 0)]);

        let snapshot = snapshot(&state, "room-a").await.unwrap();
        assert_eq!(snapshot.current_round_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn departed_player_gets_a_synthesized_answer_at_deadline() {
        let state = two_player_lobby();
        join(&state, "room-e", CATEGORY, "alice").await.unwrap();
        join(&state, "room-e", CATEGORY, "bob").await.unwrap();
        let (_, mut events) = subscribe(&state, "room-e").await.unwrap();

        leave(&state, "room-e", "bob").await.unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;

        let ended = drain(&mut events)
            .into_iter()
            .find_map(|event| match event {
                SessionEvent::RoundEnded(payload) => Some(payload),
                _ => None,
            })
            .unwrap();
        assert_eq!(ended.scores.len(), 2);
        assert!(ended.scores.iter().all(|score| score.timed_out));

        let handle = state.registry().get("room-e").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.current_round_index(), 1);
        let bob = session.player("bob").unwrap();
        assert_eq!(bob.answers.len(), 1);
        assert_eq!(bob.answers[0].selected_option_index, None);
        assert_eq!(bob.answers[0].awarded_score, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn everyone_leaving_finishes_the_game() {
        let state = two_player_lobby();
        join(&state, "room-x", CATEGORY, "alice").await.unwrap();
        join(&state, "room-x", CATEGORY, "bob").await.unwrap();

        leave(&state, "room-x", "alice").await.unwrap();
        leave(&state, "room-x", "bob").await.unwrap();

        let snapshot = snapshot(&state, "room-x").await.unwrap();
        assert_eq!(snapshot.state, SessionStateDto::Finished);
        assert_eq!(snapshot.current_round_index, snapshot.total_rounds as i64);
        assert!(snapshot.leaderboard.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn rejoining_player_keeps_its_score() {
        let state = two_player_lobby();
        join(&state, "room-j", CATEGORY, "alice").await.unwrap();
        join(&state, "room-j", CATEGORY, "bob").await.unwrap();
        submit_answer(&state, "room-j", "alice", "t1", Some(0), 0)
            .await
            .unwrap();

        leave(&state, "room-j", "alice").await.unwrap();
        let rejoined = join(&state, "room-j", CATEGORY, "alice").await.unwrap();
        let alice = rejoined
            .players
            .iter()
            .find(|player| player.identifier == "alice")
            .unwrap();
        assert!(alice.connected);

        // bob's answer closes t1 and credits alice's earlier points
        submit_answer(&state, "room-j", "bob", "t1", Some(1), 0)
            .await
            .unwrap();
        let snapshot = snapshot(&state, "room-j").await.unwrap();
        let alice = snapshot
            .players
            .iter()
            .find(|player| player.identifier == "alice")
            .unwrap();
        assert_eq!(alice.score, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn live_scores_are_hidden_while_the_round_is_open() {
        let mut config = AppConfig::default();
        config.lobby.min_players = 3;
        config.lobby.max_players = 3;
        let state = test_state_with(config, None);
        for player in ["alice", "bob", "carol"] {
            join(&state, "room-h", CATEGORY, player).await.unwrap();
        }
        submit_answer(&state, "room-h", "alice", "t1", Some(0), 0)
            .await
            .unwrap();

        let open = snapshot(&state, "room-h").await.unwrap();
        assert_eq!(open.current_round_index, 0);
        assert!(open.players.iter().all(|player| player.score == 0));
        let board = leaderboard(&state, "room-h").await.unwrap();
        assert!(board.entries.iter().all(|entry| entry.score == 0 && entry.correct_answers == 0));

        for player in ["bob", "carol"] {
            submit_answer(&state, "room-h", player, "t1", Some(1), 0)
                .await
                .unwrap();
        }
        let board = leaderboard(&state, "room-h").await.unwrap();
        assert_eq!(board.entries[0].identifier, "alice");
        assert_eq!(board.entries[0].score, 200);
        assert_eq!(board.entries[0].correct_answers, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_connection_leave_keeps_the_rejoined_player() {
        let state = two_player_lobby();
        let first = join_and_subscribe(&state, "room-c", CATEGORY, "alice")
            .await
            .unwrap();
        join(&state, "room-c", CATEGORY, "bob").await.unwrap();

        leave(&state, "room-c", "alice").await.unwrap();
        let second = join_and_subscribe(&state, "room-c", CATEGORY, "alice")
            .await
            .unwrap();
        assert_ne!(first.connection, second.connection);

        let stale = leave_connection(&state, "room-c", "alice", first.connection).await;
        assert!(matches!(stale, Err(ServiceError::NotFound(_))));
        submit_answer(&state, "room-c", "alice", "t1", Some(0), 0)
            .await
            .unwrap();

        leave_connection(&state, "room-c", "alice", second.connection)
            .await
            .unwrap();
        let snapshot = snapshot(&state, "room-c").await.unwrap();
        let alice = snapshot
            .players
            .iter()
            .find(|player| player.identifier == "alice")
            .unwrap();
        assert!(!alice.connected);
    }

    #[tokio::test(start_paused = true)]
    async fn final_leaderboard_breaks_ties_by_join_order() {
        let state = two_player_lobby();
        join(&state, "room-t", CATEGORY, "alice").await.unwrap();
        join(&state, "room-t", CATEGORY, "bob").await.unwrap();

        for (round_id, option) in [("t1", 0), ("t2", 1), ("t3", 2)] {
            submit_answer(&state, "room-t", "bob", round_id, Some(option), 0)
                .await
                .unwrap();
            submit_answer(&state, "room-t", "alice", round_id, Some(option), 0)
                .await
                .unwrap();
        }

        let board = leaderboard(&state, "room-t").await.unwrap();
        assert_eq!(board.state, SessionStateDto::Finished);
        let order: Vec<_> = board.entries.iter().map(|e| (e.identifier.as_str(), e.rank)).collect();
        assert_eq!(order, [("alice", 1), ("bob", 2)]);
        assert_eq!(board.entries[0].score, 600);
    }
}
