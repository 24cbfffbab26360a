//! Builders for the events published on a session's stream.
//!
//! Every function takes the locked session so sequence numbers follow mutation order.

use tracing::debug;

use crate::{
    dto::{
        events::{
            AnswerReceivedEvent, GameEndedEvent, GameStartedEvent, PlayerJoinedEvent,
            PlayerLeftEvent, ResultsArchivedEvent, RoundEndedEvent, RoundStartedEvent,
            SessionEvent,
        },
        format_system_time,
        session::{PlayerSummary, RoundPublic, leaderboard_entries},
    },
    state::{
        SessionHandle,
        session::{JoinOutcome, LeaveOutcome, RoundOutcome, Session},
        state_machine::FinishReason,
    },
};

fn publish(handle: &SessionHandle, session: &mut Session, event: SessionEvent) {
    let name = event.name();
    let seq = handle.publish(session, event);
    debug!(
        session_id = %handle.id(),
        seq,
        event = name,
        subscribers = handle.subscriber_count(),
        "published session event"
    );
}

/// Announce a join or rejoin with the player's roster entry.
pub fn player_joined(
    handle: &SessionHandle,
    session: &mut Session,
    identifier: &str,
    outcome: JoinOutcome,
) {
    let Some(player) = session.player(identifier).map(PlayerSummary::from) else {
        return;
    };
    let payload = PlayerJoinedEvent {
        player,
        rejoined: outcome == JoinOutcome::Rejoined,
        roster_size: session.roster_len(),
    };
    publish(handle, session, SessionEvent::PlayerJoined(payload));
}

/// Announce a leave; `departed` tells whether the player stays ranked.
pub fn player_left(
    handle: &SessionHandle,
    session: &mut Session,
    identifier: &str,
    outcome: LeaveOutcome,
) {
    let payload = PlayerLeftEvent {
        player: identifier.to_owned(),
        departed: outcome == LeaveOutcome::Departed,
    };
    publish(handle, session, SessionEvent::PlayerLeft(payload));
}

/// Announce the start with the first round's deadline.
pub fn game_started(handle: &SessionHandle, session: &mut Session) {
    let Some(deadline) = session.round_deadline_at() else {
        return;
    };
    let payload = GameStartedEvent {
        total_rounds: session.rounds().len(),
        first_round_deadline: format_system_time(deadline),
    };
    publish(handle, session, SessionEvent::GameStarted(payload));
}

/// Announce the current round without its answer key.
pub fn round_started(handle: &SessionHandle, session: &mut Session) {
    let (Some(round), Some(deadline)) = (session.current_round(), session.round_deadline_at())
    else {
        return;
    };
    let payload = RoundStartedEvent {
        round: RoundPublic::new(round, session.current_round_index().max(0) as usize),
        deadline: format_system_time(deadline),
    };
    publish(handle, session, SessionEvent::RoundStarted(payload));
}

/// Announce that `player` answered, without correctness.
pub fn answer_received(handle: &SessionHandle, session: &mut Session, player: &str, round_id: &str) {
    let payload = AnswerReceivedEvent {
        player: player.to_owned(),
        round_id: round_id.to_owned(),
    };
    publish(handle, session, SessionEvent::AnswerReceived(payload));
}

/// Reveal the answer key and each player's points.
pub fn round_ended(handle: &SessionHandle, session: &mut Session, outcome: RoundOutcome) {
    publish(handle, session, SessionEvent::RoundEnded(RoundEndedEvent::from(outcome)));
}

/// Announce the finish with the final leaderboard.
pub fn game_ended(handle: &SessionHandle, session: &mut Session, reason: FinishReason) {
    let payload = GameEndedEvent {
        reason: reason.into(),
        leaderboard: leaderboard_entries(session),
    };
    publish(handle, session, SessionEvent::GameEnded(payload));
}

/// Report whether the final leaderboard was stored.
pub fn results_archived(handle: &SessionHandle, session: &mut Session, archived: bool) {
    publish(
        handle,
        session,
        SessionEvent::ResultsArchived(ResultsArchivedEvent { archived }),
    );
}
