use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::session::{FinishReasonDto, LeaderboardEntry, PlayerSummary, RoundPublic},
    state::session::{RoundAward, RoundOutcome},
};

/// Session event stamped with its position in the session's event order.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventEnvelope {
    /// Starts at 1 and increases by one per published event.
    pub seq: u64,
    /// Session the event belongs to.
    pub session_id: String,
    /// Event name and payload, flattened into the envelope.
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Outbound state changes, in the order the session accepted them.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A player entered the roster or came back.
    PlayerJoined(PlayerJoinedEvent),
    /// A player left the lobby or departed the game.
    PlayerLeft(PlayerLeftEvent),
    /// The lobby closed and the first round opened.
    GameStarted(GameStartedEvent),
    /// A round opened for answers.
    RoundStarted(RoundStartedEvent),
    /// A player's answer was accepted.
    AnswerReceived(AnswerReceivedEvent),
    /// A round closed; carries the answer key and points.
    RoundEnded(RoundEndedEvent),
    /// The session finished.
    GameEnded(GameEndedEvent),
    /// Outcome of writing the final leaderboard to storage.
    ResultsArchived(ResultsArchivedEvent),
}

impl SessionEvent {
    /// Name used as SSE event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayerJoined(_) => "player_joined",
            Self::PlayerLeft(_) => "player_left",
            Self::GameStarted(_) => "game_started",
            Self::RoundStarted(_) => "round_started",
            Self::AnswerReceived(_) => "answer_received",
            Self::RoundEnded(_) => "round_ended",
            Self::GameEnded(_) => "game_ended",
            Self::ResultsArchived(_) => "results_archived",
        }
    }
}

/// Payload of `player_joined`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerJoinedEvent {
    /// Roster entry as it stands after the join.
    pub player: PlayerSummary,
    /// A departed player came back and kept its score.
    pub rejoined: bool,
    /// Roster size including the new player.
    pub roster_size: usize,
}

/// Payload of `player_left`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerLeftEvent {
    /// Identifier of the leaving player.
    pub player: String,
    /// `true` when the player stays on the leaderboard (game running or over).
    pub departed: bool,
}

/// Payload of `game_started`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameStartedEvent {
    /// Number of rounds in the game.
    pub total_rounds: usize,
    /// RFC3339 deadline of round 0.
    pub first_round_deadline: String,
}

/// Payload of `round_started`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundStartedEvent {
    /// The round, without its answer.
    pub round: RoundPublic,
    /// RFC3339 instant after which answers are refused.
    pub deadline: String,
}

/// Someone answered; correctness stays hidden until the round ends.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerReceivedEvent {
    /// Identifier of the answering player.
    pub player: String,
    /// Round the answer was given for.
    pub round_id: String,
}

/// Points one player got from a closed round.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundScore {
    /// Identifier of the scored player.
    pub player: String,
    /// Chosen option, `None` on timeout.
    pub selected_option_index: Option<usize>,
    /// Points from this round.
    pub awarded_score: u32,
    /// The answer was synthesized because the round closed first.
    pub timed_out: bool,
    /// Score after this round.
    pub total_score: u32,
}

impl From<RoundAward> for RoundScore {
    fn from(award: RoundAward) -> Self {
        Self {
            player: award.player,
            selected_option_index: award.selected_option_index,
            awarded_score: award.awarded_score,
            timed_out: award.timed_out,
            total_score: award.total_score,
        }
    }
}

/// Payload of `round_ended`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundEndedEvent {
    /// Round that closed.
    pub round_id: String,
    /// Zero-based position of the round.
    pub round_index: usize,
    /// Answer key, revealed now that the round is closed.
    pub correct_option_index: usize,
    /// One entry per roster member, in join order.
    pub scores: Vec<RoundScore>,
}

impl From<RoundOutcome> for RoundEndedEvent {
    fn from(outcome: RoundOutcome) -> Self {
        Self {
            round_id: outcome.round_id,
            round_index: outcome.round_index,
            correct_option_index: outcome.correct_option_index,
            scores: outcome.awards.into_iter().map(Into::into).collect(),
        }
    }
}

/// Payload of `game_ended`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GameEndedEvent {
    /// Why the game ended.
    pub reason: FinishReasonDto,
    /// Final standings.
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// The final leaderboard reached durable storage (or could not).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResultsArchivedEvent {
    /// `false` when no store was available or the write failed.
    pub archived: bool,
}

/// Sent instead of the events a slow subscriber missed.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ResyncRequired {
    /// Session whose stream lagged.
    pub session_id: String,
    /// Number of events dropped for this subscriber.
    pub missed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_flattens_event_name_and_payload() {
        let envelope = EventEnvelope {
            seq: 7,
            session_id: "room-1".into(),
            event: SessionEvent::AnswerReceived(AnswerReceivedEvent {
                player: "0xabc".into(),
                round_id: "tech-3".into(),
            }),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["seq"], 7);
        assert_eq!(json["event"], "answer_received");
        assert_eq!(json["data"]["round_id"], "tech-3");
        assert_eq!(envelope.event.name(), "answer_received");
    }
}
