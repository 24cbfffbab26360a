//! Authoritative in-memory state of one game.
//!
//! Everything here is synchronous: callers serialize access through the per-session mutex
//! held by [`SessionHandle`](super::registry::SessionHandle) and pass the current time in,
//! which keeps round transitions deterministic under test.

use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use tokio::{task::AbortHandle, time::Instant};

use crate::{
    error::ServiceError,
    state::{
        round::Round,
        scoring,
        state_machine::{
            FinishReason, InvalidTransition, LifecycleEvent, SessionPhase, SessionStateMachine,
        },
    },
};

/// One player's response to one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Round answered.
    pub round_id: String,
    /// `None` when the round closed before the player answered.
    pub selected_option_index: Option<usize>,
    /// Effective elapsed time used for scoring.
    pub elapsed_ms: u64,
    /// The selected option was the right one.
    pub correct: bool,
    /// Points earned, credited once the round closes.
    pub awarded_score: u32,
    /// Counted in the player's score; set when the round closes.
    pub credited: bool,
}

/// Participant of a session. Score is keyed by identifier and survives reconnects.
#[derive(Debug, Clone)]
pub struct Player {
    /// Normalized identifier.
    pub identifier: String,
    /// First join; breaks score ties.
    pub joined_at: SystemTime,
    /// Points from closed rounds only; an open round's answer is not visible here.
    pub score: u32,
    /// One per round reached, in round order.
    pub answers: Vec<Answer>,
    /// Answered every round, or left while the game was running.
    pub finished: bool,
    /// Currently in the session.
    pub connected: bool,
    /// Generation assigned at the latest (re)join; a stale connection cannot depart a newer one.
    pub connection: u64,
}

impl Player {
    fn new(identifier: String, joined_at: SystemTime) -> Self {
        Self {
            identifier,
            joined_at,
            score: 0,
            answers: Vec::new(),
            finished: false,
            connected: true,
            connection: 0,
        }
    }

    /// Answer given to `round_id`, credited or not.
    pub fn answer_for(&self, round_id: &str) -> Option<&Answer> {
        self.answers.iter().find(|answer| answer.round_id == round_id)
    }

    /// Correct answers in closed rounds.
    pub fn correct_answers(&self) -> u32 {
        self.answers
            .iter()
            .filter(|answer| answer.credited && answer.correct)
            .count() as u32
    }

    fn record(&mut self, answer: Answer, total_rounds: usize) {
        self.answers.push(answer);
        if self.answers.len() >= total_rounds {
            self.finished = true;
        }
    }

    fn credit(&mut self, round_id: &str) {
        let Some(answer) = self
            .answers
            .iter_mut()
            .find(|answer| answer.round_id == round_id && !answer.credited)
        else {
            return;
        };
        answer.credited = true;
        self.score += answer.awarded_score;
    }
}

/// Result of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// New roster entry.
    Joined,
    /// A departed player came back during the game and keeps its score.
    Rejoined,
}

/// Result of a successful leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// Removed from the lobby.
    Removed,
    /// Kept on the leaderboard but no longer scoring.
    Departed,
}

/// Accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerReceipt {
    /// Round the submission was recorded for.
    pub round_id: String,
    /// Elapsed time actually used for scoring.
    pub elapsed_ms: u64,
}

/// Points one player earned in a closed round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundAward {
    /// Player identifier.
    pub player: String,
    /// Chosen option, `None` on timeout.
    pub selected_option_index: Option<usize>,
    /// Points from this round.
    pub awarded_score: u32,
    /// The answer was synthesized at close.
    pub timed_out: bool,
    /// Score after crediting this round.
    pub total_score: u32,
}

/// Everything revealed when a round closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    /// Round that closed.
    pub round_id: String,
    /// Zero-based position of the round.
    pub round_index: usize,
    /// Answer key.
    pub correct_option_index: usize,
    /// One per roster member, in join order.
    pub awards: Vec<RoundAward>,
}

/// Where the session went after a round closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The round at this index opened.
    RoundStarted(usize),
    /// No round follows; the game is over.
    Finished(FinishReason),
}

/// Leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    /// 1-based position.
    pub rank: u32,
    /// Player identifier.
    pub identifier: String,
    /// Points from closed rounds.
    pub score: u32,
    /// Correct answers in closed rounds.
    pub correct_answers: u32,
    /// First join.
    pub joined_at: SystemTime,
    /// Currently in the session.
    pub connected: bool,
    /// No further rounds count for this player.
    pub finished: bool,
}

#[derive(Debug, Clone, Copy)]
struct RoundClock {
    started_at: Instant,
    deadline: Instant,
    deadline_at: SystemTime,
    closed: bool,
}

/// Cancellable timers attached to a session.
#[derive(Debug, Default)]
pub struct SessionTimers {
    round: Option<AbortHandle>,
    lobby: Option<AbortHandle>,
}

impl SessionTimers {
    /// Track the round driver, aborting a previous one.
    pub fn set_round(&mut self, handle: AbortHandle) {
        if let Some(previous) = self.round.replace(handle) {
            previous.abort();
        }
    }

    /// Abort the round driver.
    pub fn cancel_round(&mut self) {
        if let Some(handle) = self.round.take() {
            handle.abort();
        }
    }

    /// Forget the round timer without aborting it; used by the timer task itself.
    pub fn release_round(&mut self) {
        self.round.take();
    }

    /// Track the lobby timer, aborting a previous one.
    pub fn set_lobby(&mut self, handle: AbortHandle) {
        if let Some(previous) = self.lobby.replace(handle) {
            previous.abort();
        }
    }

    /// A lobby timer is pending.
    pub fn lobby_armed(&self) -> bool {
        self.lobby.is_some()
    }

    /// Abort the lobby timer.
    pub fn cancel_lobby(&mut self) {
        if let Some(handle) = self.lobby.take() {
            handle.abort();
        }
    }

    /// Forget the lobby timer without aborting it; used by the timer task itself.
    pub fn release_lobby(&mut self) {
        self.lobby.take();
    }

    fn cancel_all(&mut self) {
        self.cancel_round();
        self.cancel_lobby();
    }
}

/// One game instance.
#[derive(Debug)]
pub struct Session {
    id: String,
    category_id: String,
    machine: SessionStateMachine,
    roster: IndexMap<String, Player>,
    rounds: Vec<Round>,
    round_index: Option<usize>,
    clock: Option<RoundClock>,
    created_at: SystemTime,
    lobby_expired: bool,
    finished_at: Option<SystemTime>,
    finished_instant: Option<Instant>,
    unreported_finish: Option<FinishReason>,
    results_archived: Option<bool>,
    last_seq: u64,
    connections: u64,
    retired: bool,
    /// Round driver and lobby timer of this session.
    pub timers: SessionTimers,
}

impl Session {
    /// New `WAITING` session over `rounds`; refuses an empty question list.
    pub fn new(
        id: impl Into<String>,
        category_id: impl Into<String>,
        rounds: Vec<Round>,
    ) -> Result<Self, ServiceError> {
        let category_id = category_id.into();
        if rounds.is_empty() {
            return Err(ServiceError::InvalidState(format!(
                "category `{category_id}` has no questions"
            )));
        }

        Ok(Self {
            id: id.into(),
            category_id,
            machine: SessionStateMachine::new(),
            roster: IndexMap::new(),
            rounds,
            round_index: None,
            clock: None,
            created_at: SystemTime::now(),
            lobby_expired: false,
            finished_at: None,
            finished_instant: None,
            unreported_finish: None,
            results_archived: None,
            last_seq: 0,
            connections: 0,
            retired: false,
            timers: SessionTimers::default(),
        })
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Category the rounds were drawn from.
    pub fn category_id(&self) -> &str {
        &self.category_id
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.machine.phase()
    }

    /// Number of phase transitions applied so far.
    pub fn version(&self) -> usize {
        self.machine.version()
    }

    /// Creation time.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// All rounds in play order.
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// Roster in join order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.roster.values()
    }

    /// Roster entry for `identifier`.
    pub fn player(&self, identifier: &str) -> Option<&Player> {
        self.roster.get(identifier)
    }

    /// Roster size, departed players included.
    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }

    /// `-1` before the game started, `len(rounds)` once finished.
    pub fn current_round_index(&self) -> i64 {
        self.round_index.map_or(-1, |index| index as i64)
    }

    /// Round currently being played, if any.
    pub fn current_round(&self) -> Option<&Round> {
        if self.phase() != SessionPhase::Active {
            return None;
        }
        self.round_index.and_then(|index| self.rounds.get(index))
    }

    /// Monotonic deadline of the latest round.
    pub fn round_deadline(&self) -> Option<Instant> {
        self.clock.map(|clock| clock.deadline)
    }

    /// Wall-clock deadline of the current round, as shown to clients.
    pub fn round_deadline_at(&self) -> Option<SystemTime> {
        self.current_round()
            .and(self.clock)
            .map(|clock| clock.deadline_at)
    }

    /// Time left in the current round at `now`; zero once closed.
    pub fn time_remaining(&self, now: Instant) -> Option<Duration> {
        let clock = self.current_round().and(self.clock)?;
        if clock.closed {
            return Some(Duration::ZERO);
        }
        Some(clock.deadline.saturating_duration_since(now))
    }

    /// When the game finished.
    pub fn finished_at(&self) -> Option<SystemTime> {
        self.finished_at
    }

    /// Archiving outcome, once attempted.
    pub fn results_archived(&self) -> Option<bool> {
        self.results_archived
    }

    /// Record the archiving outcome.
    pub fn mark_results_archived(&mut self, archived: bool) {
        self.results_archived = Some(archived);
    }

    /// Sequence number of the last published event.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub(crate) fn next_seq(&mut self) -> u64 {
        self.last_seq += 1;
        self.last_seq
    }

    /// Lobby with nobody left in it.
    pub fn is_idle(&self) -> bool {
        self.phase() == SessionPhase::Waiting && self.roster.is_empty()
    }

    /// Removed from the registry; callers holding the handle must back off.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Detach the session from the registry; later joins must create a fresh one.
    pub fn retire(&mut self) {
        self.retired = true;
        self.timers.cancel_all();
    }

    /// Finished long enough ago to be dropped from memory.
    pub fn expired(&self, now: Instant, retention: Duration) -> bool {
        self.finished_instant
            .is_some_and(|finished| now >= finished + retention)
    }

    /// Finish reason of a transition nobody handled yet; yields it once.
    pub fn take_unreported_finish(&mut self) -> Option<FinishReason> {
        self.unreported_finish.take()
    }

    /// The lobby timeout elapsed; a minimum roster may now start.
    pub fn mark_lobby_expired(&mut self) {
        self.lobby_expired = true;
    }

    /// Start condition: enough players, and either a full lobby or an expired lobby timer.
    pub fn ready_to_start(&self, min_players: usize, max_players: usize) -> bool {
        let size = self.roster.len();
        self.phase() == SessionPhase::Waiting
            && size >= min_players
            && (size >= max_players || self.lobby_expired)
    }

    /// Add `identifier` to the roster, or reconnect a departed player during the game.
    pub fn add_player(
        &mut self,
        identifier: &str,
        max_players: usize,
        now: SystemTime,
    ) -> Result<JoinOutcome, ServiceError> {
        match self.phase() {
            SessionPhase::Waiting => {
                if self.roster.contains_key(identifier) {
                    return Err(ServiceError::DuplicateIdentifier(identifier.to_owned()));
                }
                if self.roster.len() >= max_players {
                    return Err(ServiceError::RosterFull { max: max_players });
                }
                let mut player = Player::new(identifier.to_owned(), now);
                player.connection = self.next_connection();
                self.roster.insert(identifier.to_owned(), player);
                Ok(JoinOutcome::Joined)
            }
            SessionPhase::Active => {
                let total_rounds = self.rounds.len();
                let connection = self.connections + 1;
                match self.roster.get_mut(identifier) {
                    Some(player) if player.connected => {
                        Err(ServiceError::DuplicateIdentifier(identifier.to_owned()))
                    }
                    Some(player) => {
                        self.connections = connection;
                        player.connection = connection;
                        player.connected = true;
                        player.finished = player.answers.len() >= total_rounds;
                        Ok(JoinOutcome::Rejoined)
                    }
                    None => Err(ServiceError::InvalidState(
                        "game already started; only returning players may join".into(),
                    )),
                }
            }
            SessionPhase::Finished(_) => {
                Err(ServiceError::InvalidState("game already finished".into()))
            }
        }
    }

    fn next_connection(&mut self) -> u64 {
        self.connections += 1;
        self.connections
    }

    /// Connection generation of the player's current membership.
    pub fn connection_of(&self, identifier: &str) -> Option<u64> {
        self.roster.get(identifier).map(|player| player.connection)
    }

    /// Leave on behalf of one connection; a membership renewed by a later join is untouched.
    pub fn remove_connection(
        &mut self,
        identifier: &str,
        connection: u64,
    ) -> Result<LeaveOutcome, ServiceError> {
        if self.connection_of(identifier) != Some(connection) {
            return Err(ServiceError::NotFound(format!(
                "player `{identifier}` on connection {connection}"
            )));
        }
        self.remove_player(identifier)
    }

    /// Drop a lobby member, or mark a player departed once the game runs.
    pub fn remove_player(&mut self, identifier: &str) -> Result<LeaveOutcome, ServiceError> {
        let not_found = || ServiceError::NotFound(format!("player `{identifier}`"));
        match self.phase() {
            SessionPhase::Waiting => {
                self.roster.shift_remove(identifier).ok_or_else(not_found)?;
                Ok(LeaveOutcome::Removed)
            }
            SessionPhase::Active | SessionPhase::Finished(_) => {
                let player = self
                    .roster
                    .get_mut(identifier)
                    .filter(|player| player.connected)
                    .ok_or_else(not_found)?;
                player.connected = false;
                player.finished = true;
                Ok(LeaveOutcome::Departed)
            }
        }
    }

    /// Leave the lobby and open round 0.
    pub fn start(&mut self, now: Instant, wall: SystemTime) -> Result<(), InvalidTransition> {
        self.machine.apply(LifecycleEvent::Start)?;
        self.round_index = Some(0);
        self.open_round(0, now, wall);
        Ok(())
    }

    fn open_round(&mut self, index: usize, now: Instant, wall: SystemTime) {
        let duration = self.rounds[index].duration();
        self.clock = Some(RoundClock {
            started_at: now,
            deadline: now + duration,
            deadline_at: wall + duration,
            closed: false,
        });
    }

    /// Score a submission for the current round.
    ///
    /// The elapsed time used is the larger of the client's claim and the server-observed
    /// time minus `latency_allowance`, clamped to the round duration.
    pub fn submit_answer(
        &mut self,
        identifier: &str,
        round_id: &str,
        selected_option_index: Option<usize>,
        client_elapsed_ms: u64,
        latency_allowance: Duration,
        now: Instant,
    ) -> Result<AnswerReceipt, ServiceError> {
        let index = match self.phase() {
            SessionPhase::Waiting => {
                return Err(ServiceError::InvalidState("game has not started".into()));
            }
            SessionPhase::Finished(_) => {
                return Err(ServiceError::RoundClosed {
                    round_id: round_id.to_owned(),
                });
            }
            SessionPhase::Active => self.round_index.unwrap_or_default(),
        };

        let total_rounds = self.rounds.len();
        let round = &self.rounds[index];
        let player = self
            .roster
            .get_mut(identifier)
            .ok_or_else(|| ServiceError::NotFound(format!("player `{identifier}`")))?;

        if !player.connected {
            return Err(ServiceError::InvalidState("player left the session".into()));
        }
        if round.id != round_id {
            return Err(ServiceError::StaleRound {
                round_id: round_id.to_owned(),
            });
        }
        if player.answer_for(round_id).is_some() {
            return Err(ServiceError::AlreadyAnswered {
                player: identifier.to_owned(),
                round_id: round_id.to_owned(),
            });
        }
        let clock = match self.clock {
            Some(clock) if !clock.closed && now < clock.deadline => clock,
            _ => {
                return Err(ServiceError::RoundClosed {
                    round_id: round_id.to_owned(),
                });
            }
        };
        if let Some(selected) = selected_option_index
            && selected >= round.options.len()
        {
            return Err(ServiceError::InvalidInput(format!(
                "option {selected} does not exist (round has {} options)",
                round.options.len()
            )));
        }

        let observed_ms = now.saturating_duration_since(clock.started_at).as_millis() as u64;
        let allowance_ms = latency_allowance.as_millis() as u64;
        let elapsed_ms = client_elapsed_ms
            .max(observed_ms.saturating_sub(allowance_ms))
            .min(round.duration_ms);

        let awarded_score = scoring::score(round, selected_option_index, elapsed_ms);
        player.record(
            Answer {
                round_id: round.id.clone(),
                selected_option_index,
                elapsed_ms,
                correct: selected_option_index.is_some_and(|selected| round.is_correct(selected)),
                awarded_score,
                credited: false,
            },
            total_rounds,
        );

        Ok(AnswerReceipt {
            round_id: round.id.clone(),
            elapsed_ms,
        })
    }

    /// Every player still in the game answered the current round.
    pub fn round_complete(&self) -> bool {
        let Some(round) = self.current_round() else {
            return false;
        };
        self.roster
            .values()
            .all(|player| player.finished || player.answer_for(&round.id).is_some())
    }

    /// Close the current round, synthesizing a zero-score answer for every player without one.
    ///
    /// Returns `None` when the round was already closed, so concurrent triggers collapse to one.
    pub fn close_round(&mut self) -> Option<RoundOutcome> {
        let index = self.round_index?;
        let round = self.current_round()?.clone();
        let clock = self.clock.as_mut()?;
        if clock.closed {
            return None;
        }
        clock.closed = true;

        let total_rounds = self.rounds.len();
        let awards = self
            .roster
            .values_mut()
            .map(|player| {
                let timed_out = player.answer_for(&round.id).is_none();
                if timed_out {
                    player.record(
                        Answer {
                            round_id: round.id.clone(),
                            selected_option_index: None,
                            elapsed_ms: round.duration_ms,
                            correct: false,
                            awarded_score: 0,
                            credited: false,
                        },
                        total_rounds,
                    );
                }
                player.credit(&round.id);
                let answer = player.answer_for(&round.id);
                RoundAward {
                    player: player.identifier.clone(),
                    selected_option_index: answer.and_then(|a| a.selected_option_index),
                    awarded_score: answer.map_or(0, |a| a.awarded_score),
                    timed_out,
                    total_score: player.score,
                }
            })
            .collect();

        Some(RoundOutcome {
            round_id: round.id,
            round_index: index,
            correct_option_index: round.correct_option_index,
            awards,
        })
    }

    /// Move past a closed round.
    pub fn advance(&mut self, now: Instant, wall: SystemTime) -> Result<Progress, InvalidTransition> {
        let next = self.round_index.map_or(0, |index| index + 1);
        if next >= self.rounds.len() {
            self.finish(FinishReason::RoundsConsumed, now, wall)?;
            return Ok(Progress::Finished(FinishReason::RoundsConsumed));
        }
        if !self.roster.is_empty() && self.roster.values().all(|player| player.finished) {
            self.finish(FinishReason::AllPlayersFinished, now, wall)?;
            return Ok(Progress::Finished(FinishReason::AllPlayersFinished));
        }

        self.machine.apply(LifecycleEvent::NextRound)?;
        self.round_index = Some(next);
        self.open_round(next, now, wall);
        Ok(Progress::RoundStarted(next))
    }

    fn finish(
        &mut self,
        reason: FinishReason,
        now: Instant,
        wall: SystemTime,
    ) -> Result<(), InvalidTransition> {
        self.machine.apply(LifecycleEvent::Finish(reason))?;
        self.round_index = Some(self.rounds.len());
        if let Some(clock) = self.clock.as_mut() {
            clock.closed = true;
        }
        self.finished_at = Some(wall);
        self.finished_instant = Some(now);
        self.unreported_finish = Some(reason);
        self.timers.cancel_all();
        Ok(())
    }

    /// Players by score, highest first; ties go to the earlier joiner.
    pub fn leaderboard(&self) -> Vec<Standing> {
        let mut players: Vec<&Player> = self.roster.values().collect();
        players.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.joined_at.cmp(&b.joined_at))
        });

        players
            .into_iter()
            .enumerate()
            .map(|(position, player)| Standing {
                rank: position as u32 + 1,
                identifier: player.identifier.clone(),
                score: player.score,
                correct_answers: player.correct_answers(),
                joined_at: player.joined_at,
                connected: player.connected,
                finished: player.finished,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::round::RoundKind;

    const ALLOWANCE: Duration = Duration::from_millis(1_500);

    fn rounds(count: usize) -> Vec<Round> {
        (0..count)
            .map(|i| Round {
                id: format!("q{i}"),
                kind: RoundKind::Text {
                    prompt: format!("question {i}"),
                },
                options: vec!["a".into(), "b".into(), "c".into()],
                correct_option_index: 1,
                duration_ms: 30_000,
            })
            .collect()
    }

    fn started(players: &[&str], round_count: usize) -> (Session, Instant) {
        let mut session = Session::new("s1", "technology", rounds(round_count)).unwrap();
        let base = SystemTime::UNIX_EPOCH;
        for (offset, player) in players.iter().enumerate() {
            session
                .add_player(player, 20, base + Duration::from_secs(offset as u64))
                .unwrap();
        }
        let now = Instant::now();
        session.start(now, SystemTime::now()).unwrap();
        (session, now)
    }

    fn assert_score_matches_answers(session: &Session) {
        for player in session.players() {
            let sum: u32 = player
                .answers
                .iter()
                .filter(|a| a.credited)
                .map(|a| a.awarded_score)
                .sum();
            assert_eq!(player.score, sum, "score drift for {}", player.identifier);
        }
    }

    #[test]
    fn session_without_questions_is_refused() {
        assert!(Session::new("s1", "empty", Vec::new()).is_err());
    }

    #[test]
    fn lobby_rejects_duplicates_and_overflow() {
        let mut session = Session::new("s1", "technology", rounds(1)).unwrap();
        let now = SystemTime::now();
        session.add_player("alice", 2, now).unwrap();
        assert!(matches!(
            session.add_player("alice", 2, now),
            Err(ServiceError::DuplicateIdentifier(_))
        ));
        session.add_player("bob", 2, now).unwrap();
        assert!(matches!(
            session.add_player("carol", 2, now),
            Err(ServiceError::RosterFull { max: 2 })
        ));
    }

    #[test]
    fn leaving_the_lobby_removes_the_player() {
        let mut session = Session::new("s1", "technology", rounds(1)).unwrap();
        session.add_player("alice", 20, SystemTime::now()).unwrap();
        assert_eq!(session.remove_player("alice").unwrap(), LeaveOutcome::Removed);
        assert!(session.is_idle());
        assert!(matches!(
            session.remove_player("alice"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn start_condition_needs_minimum_and_full_lobby_or_timeout() {
        let mut session = Session::new("s1", "technology", rounds(1)).unwrap();
        let now = SystemTime::now();
        session.add_player("alice", 3, now).unwrap();
        assert!(!session.ready_to_start(2, 3));
        session.add_player("bob", 3, now).unwrap();
        assert!(!session.ready_to_start(2, 3));
        session.mark_lobby_expired();
        assert!(session.ready_to_start(2, 3));

        let mut full = Session::new("s2", "technology", rounds(1)).unwrap();
        full.add_player("alice", 2, now).unwrap();
        full.add_player("bob", 2, now).unwrap();
        assert!(full.ready_to_start(2, 2));
    }

    #[test]
    fn start_opens_the_first_round() {
        let (session, now) = started(&["alice", "bob"], 3);
        assert_eq!(session.phase(), SessionPhase::Active);
        assert_eq!(session.current_round_index(), 0);
        assert_eq!(session.current_round().unwrap().id, "q0");
        assert_eq!(
            session.round_deadline(),
            Some(now + Duration::from_millis(30_000))
        );
    }

    #[test]
    fn second_answer_for_the_same_round_is_rejected() {
        let (mut session, now) = started(&["alice", "bob"], 2);
        session
            .submit_answer("alice", "q0", Some(1), 0, ALLOWANCE, now)
            .unwrap();
        let second = session.submit_answer("alice", "q0", Some(0), 0, ALLOWANCE, now);
        assert!(matches!(second, Err(ServiceError::AlreadyAnswered { .. })));

        let alice = session.player("alice").unwrap();
        assert_eq!(alice.answers.len(), 1);
        assert_eq!(alice.answers[0].awarded_score, 200);
    }

    #[test]
    fn scores_stay_hidden_until_the_round_closes() {
        let (mut session, now) = started(&["alice", "bob"], 2);
        session
            .submit_answer("alice", "q0", Some(1), 0, ALLOWANCE, now)
            .unwrap();

        let alice = session.player("alice").unwrap();
        assert_eq!(alice.score, 0);
        assert_eq!(alice.correct_answers(), 0);
        let board = session.leaderboard();
        assert!(board.iter().all(|standing| standing.score == 0));
        assert!(board.iter().all(|standing| standing.correct_answers == 0));

        let outcome = session.close_round().unwrap();
        let award = outcome.awards.iter().find(|a| a.player == "alice").unwrap();
        assert_eq!(award.total_score, 200);
        let alice = session.player("alice").unwrap();
        assert_eq!(alice.score, 200);
        assert_eq!(alice.correct_answers(), 1);
        assert_score_matches_answers(&session);
    }

    #[test]
    fn submission_for_another_round_is_stale() {
        let (mut session, now) = started(&["alice", "bob"], 2);
        let result = session.submit_answer("alice", "q1", Some(1), 0, ALLOWANCE, now);
        assert!(matches!(result, Err(ServiceError::StaleRound { .. })));
    }

    #[test]
    fn submission_after_deadline_is_closed_even_before_the_timer_fired() {
        let (mut session, now) = started(&["alice", "bob"], 2);
        let late = now + Duration::from_millis(30_000);
        let result = session.submit_answer("alice", "q0", Some(1), 0, ALLOWANCE, late);
        assert!(matches!(result, Err(ServiceError::RoundClosed { .. })));
    }

    #[test]
    fn out_of_range_option_is_invalid() {
        let (mut session, now) = started(&["alice", "bob"], 1);
        let result = session.submit_answer("alice", "q0", Some(7), 0, ALLOWANCE, now);
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
        assert!(session.player("alice").unwrap().answers.is_empty());
    }

    #[test]
    fn client_cannot_claim_less_time_than_the_server_observed() {
        let (mut session, now) = started(&["alice", "bob"], 1);
        let receipt = session
            .submit_answer(
                "alice",
                "q0",
                Some(1),
                0,
                ALLOWANCE,
                now + Duration::from_millis(10_000),
            )
            .unwrap();
        assert_eq!(receipt.elapsed_ms, 8_500);
        session.close_round().unwrap();
        // 21500 / 30000 * 100 = 71.66..
        assert_eq!(session.player("alice").unwrap().score, 171);
    }

    #[test]
    fn closing_synthesizes_timeouts_exactly_once() {
        let (mut session, now) = started(&["alice", "bob", "carol"], 2);
        session
            .submit_answer("alice", "q0", Some(1), 0, ALLOWANCE, now)
            .unwrap();

        let outcome = session.close_round().unwrap();
        assert_eq!(outcome.awards.len(), 3);
        assert_eq!(outcome.awards.iter().filter(|a| a.timed_out).count(), 2);
        for player in ["bob", "carol"] {
            let answer = session.player(player).unwrap().answer_for("q0").unwrap();
            assert_eq!(answer.selected_option_index, None);
            assert_eq!(answer.elapsed_ms, 30_000);
            assert_eq!(answer.awarded_score, 0);
        }

        assert!(session.close_round().is_none());
        assert_eq!(session.player("bob").unwrap().answers.len(), 1);
        assert_score_matches_answers(&session);
    }

    #[test]
    fn round_completes_when_remaining_players_answered() {
        let (mut session, now) = started(&["alice", "bob"], 2);
        session
            .submit_answer("alice", "q0", Some(1), 0, ALLOWANCE, now)
            .unwrap();
        assert!(!session.round_complete());
        session.remove_player("bob").unwrap();
        assert!(session.round_complete());
    }

    #[test]
    fn departed_player_keeps_score_and_can_rejoin() {
        let (mut session, now) = started(&["alice", "bob"], 3);
        session
            .submit_answer("bob", "q0", Some(1), 0, ALLOWANCE, now)
            .unwrap();
        assert_eq!(session.remove_player("bob").unwrap(), LeaveOutcome::Departed);
        assert!(session.player("bob").unwrap().finished);
        assert!(matches!(
            session.submit_answer("bob", "q0", Some(1), 0, ALLOWANCE, now),
            Err(ServiceError::InvalidState(_))
        ));
        session.close_round().unwrap();
        assert_eq!(
            session.advance(now, SystemTime::now()).unwrap(),
            Progress::RoundStarted(1)
        );

        assert_eq!(
            session.add_player("bob", 20, SystemTime::now()).unwrap(),
            JoinOutcome::Rejoined
        );
        let bob = session.player("bob").unwrap();
        assert_eq!(bob.score, 200);
        assert!(!bob.finished);
        assert!(matches!(
            session.add_player("bob", 20, SystemTime::now()),
            Err(ServiceError::DuplicateIdentifier(_))
        ));
        assert!(matches!(
            session.add_player("dave", 20, SystemTime::now()),
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[test]
    fn stale_connection_cannot_depart_a_rejoined_player() {
        let (mut session, now) = started(&["alice", "bob"], 3);
        let first = session.connection_of("alice").unwrap();
        session.remove_player("alice").unwrap();
        session.add_player("alice", 20, SystemTime::now()).unwrap();
        let second = session.connection_of("alice").unwrap();
        assert_ne!(first, second);

        assert!(matches!(
            session.remove_connection("alice", first),
            Err(ServiceError::NotFound(_))
        ));
        assert!(session.player("alice").unwrap().connected);
        session
            .submit_answer("alice", "q0", Some(1), 0, ALLOWANCE, now)
            .unwrap();

        assert_eq!(
            session.remove_connection("alice", second).unwrap(),
            LeaveOutcome::Departed
        );
    }

    #[test]
    fn lobby_rejoin_gets_a_fresh_connection() {
        let mut session = Session::new("s1", "technology", rounds(1)).unwrap();
        session.add_player("alice", 20, SystemTime::now()).unwrap();
        let first = session.connection_of("alice").unwrap();
        session.remove_player("alice").unwrap();
        session.add_player("alice", 20, SystemTime::now()).unwrap();

        assert!(session.remove_connection("alice", first).is_err());
        assert_eq!(session.roster_len(), 1);
    }

    #[test]
    fn round_index_only_moves_forward_and_stops_at_len() {
        let (mut session, now) = started(&["alice", "bob"], 3);
        let mut seen = vec![session.current_round_index()];
        loop {
            session.close_round().unwrap();
            match session.advance(now, SystemTime::now()).unwrap() {
                Progress::RoundStarted(index) => assert_eq!(index as i64, seen.len() as i64),
                Progress::Finished(reason) => {
                    assert_eq!(reason, FinishReason::RoundsConsumed);
                    break;
                }
            }
            seen.push(session.current_round_index());
        }
        seen.push(session.current_round_index());
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert!(session.advance(now, SystemTime::now()).is_err());
        assert_eq!(session.current_round_index(), 3);
        assert!(session.finished_at().is_some());
    }

    #[test]
    fn everyone_leaving_finishes_immediately() {
        let (mut session, now) = started(&["alice", "bob"], 5);
        session.remove_player("alice").unwrap();
        session.remove_player("bob").unwrap();
        session.close_round().unwrap();
        assert_eq!(
            session.advance(now, SystemTime::now()).unwrap(),
            Progress::Finished(FinishReason::AllPlayersFinished)
        );
        assert_eq!(session.current_round_index(), 5);
        for player in session.players() {
            assert!(player.answers.len() as i64 <= session.current_round_index() + 1);
        }
    }

    #[test]
    fn leaderboard_sorts_by_score_then_join_time() {
        let (mut session, now) = started(&["alice", "bob", "carol"], 1);
        session
            .submit_answer("carol", "q0", Some(1), 0, ALLOWANCE, now)
            .unwrap();
        session
            .submit_answer("alice", "q0", Some(0), 0, ALLOWANCE, now)
            .unwrap();
        session.close_round().unwrap();
        session.advance(now, SystemTime::now()).unwrap();

        let board = session.leaderboard();
        let order: Vec<_> = board.iter().map(|s| s.identifier.as_str()).collect();
        assert_eq!(order, vec!["carol", "alice", "bob"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].correct_answers, 1);
        assert_eq!(board[1].score, 0);
        assert_score_matches_answers(&session);
    }

    #[test]
    fn sequence_numbers_are_monotonic() {
        let mut session = Session::new("s1", "technology", rounds(1)).unwrap();
        assert_eq!(session.last_seq(), 0);
        assert_eq!(session.next_seq(), 1);
        assert_eq!(session.next_seq(), 2);
        assert_eq!(session.last_seq(), 2);
    }
}
