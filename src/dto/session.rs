use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::{format_system_time, validation::validate_identifier},
    state::{
        round::{Round, RoundKind},
        session::{Player, Session, Standing},
        state_machine::{FinishReason, SessionPhase},
    },
};

/// Payload used to join (and possibly create) a session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRequest {
    /// Question category; must match the session's category when it already exists.
    #[validate(length(min = 1, max = 64))]
    pub category_id: String,
    /// Verified player identifier (wallet address or nullifier hash).
    #[validate(custom(function = "validate_identifier"))]
    pub player: String,
}

/// Answer submitted for the current round. Scores are always computed server-side.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitAnswerRequest {
    /// Player submitting the answer.
    #[validate(custom(function = "validate_identifier"))]
    pub player: String,
    /// Round the answer is for; must be the current one.
    #[validate(length(min = 1, max = 128))]
    pub round_id: String,
    /// `null` means the player gave up on this round.
    pub selected_option_index: Option<usize>,
    /// Time the client saw elapse since the round started.
    pub elapsed_ms: u64,
}

/// Acknowledgement of a scored submission. Points are revealed when the round ends.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnswerAccepted {
    /// Session the answer was recorded in.
    pub session_id: String,
    /// Normalized identifier of the answering player.
    pub player: String,
    /// Round the answer was recorded for.
    pub round_id: String,
    /// Elapsed time retained for scoring.
    pub elapsed_ms: u64,
}

/// Lifecycle state as exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStateDto {
    /// Lobby open, collecting players.
    Waiting,
    /// Rounds are being played.
    Active,
    /// All rounds consumed or every player gone.
    Finished,
}

impl From<SessionPhase> for SessionStateDto {
    fn from(value: SessionPhase) -> Self {
        match value {
            SessionPhase::Waiting => Self::Waiting,
            SessionPhase::Active => Self::Active,
            SessionPhase::Finished(_) => Self::Finished,
        }
    }
}

/// Why the game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinishReasonDto {
    /// Every round was played.
    RoundsConsumed,
    /// Every player answered all rounds or left.
    AllPlayersFinished,
}

impl From<FinishReason> for FinishReasonDto {
    fn from(value: FinishReason) -> Self {
        match value {
            FinishReason::RoundsConsumed => Self::RoundsConsumed,
            FinishReason::AllPlayersFinished => Self::AllPlayersFinished,
        }
    }
}

impl FinishReasonDto {
    /// Stable name stored alongside archived results.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RoundsConsumed => "rounds_consumed",
            Self::AllPlayersFinished => "all_players_finished",
        }
    }
}

/// Kind-specific round fields.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "kind")]
pub enum RoundKindDto {
    /// Plain text question.
    #[serde(rename = "TEXT")]
    Text { prompt: String },
    /// Picture shown blurred and sharpened over the round.
    #[serde(rename = "IMAGE_REVEAL")]
    ImageReveal {
        /// Picture to reveal.
        image_url: String,
        /// Starting blur radius; clients sharpen the image as the deadline approaches.
        max_blur_px: f32,
        /// Optional caption shown with the picture.
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
    },
}

/// Public view of a round. The correct option is never included.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoundPublic {
    /// Question identifier.
    pub round_id: String,
    /// Zero-based position in the game.
    pub round_index: usize,
    /// Kind-specific content.
    #[serde(flatten)]
    pub kind: RoundKindDto,
    /// Answer options in display order.
    pub options: Vec<String>,
    /// Time allowed for answering.
    pub duration_ms: u64,
}

impl RoundPublic {
    /// Public view of `round`, hiding the answer key.
    pub fn new(round: &Round, round_index: usize) -> Self {
        let kind = match &round.kind {
            RoundKind::Text { prompt } => RoundKindDto::Text {
                prompt: prompt.clone(),
            },
            RoundKind::ImageReveal {
                image_url,
                max_blur_px,
                prompt,
            } => RoundKindDto::ImageReveal {
                image_url: image_url.clone(),
                max_blur_px: *max_blur_px,
                prompt: prompt.clone(),
            },
        };

        Self {
            round_id: round.id.clone(),
            round_index,
            kind,
            options: round.options.clone(),
            duration_ms: round.duration_ms,
        }
    }
}

/// Roster entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerSummary {
    /// Normalized player identifier.
    pub identifier: String,
    /// Points from closed rounds.
    pub score: u32,
    /// RFC3339 time of the first join.
    pub joined_at: String,
    /// Currently in the session.
    pub connected: bool,
    /// Answered every round or left a running game.
    pub finished: bool,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            identifier: player.identifier.clone(),
            score: player.score,
            joined_at: format_system_time(player.joined_at),
            connected: player.connected,
            finished: player.finished,
        }
    }
}

/// Leaderboard row.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: u32,
    /// Normalized player identifier.
    pub identifier: String,
    /// Points from closed rounds.
    pub score: u32,
    /// Correct answers in closed rounds.
    pub correct_answers: u32,
    /// RFC3339 time of the first join; breaks score ties.
    pub joined_at: String,
    /// Currently in the session.
    pub connected: bool,
}

impl From<Standing> for LeaderboardEntry {
    fn from(standing: Standing) -> Self {
        Self {
            rank: standing.rank,
            identifier: standing.identifier,
            score: standing.score,
            correct_answers: standing.correct_answers,
            joined_at: format_system_time(standing.joined_at),
            connected: standing.connected,
        }
    }
}

/// Ordered leaderboard of a live session.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    /// Session the leaderboard belongs to.
    pub session_id: String,
    /// Lifecycle state when the leaderboard was read.
    pub state: SessionStateDto,
    /// Rows ordered by rank.
    pub entries: Vec<LeaderboardEntry>,
}

impl LeaderboardResponse {
    /// Leaderboard of `session` as of its last closed round.
    pub fn new(session: &Session) -> Self {
        Self {
            session_id: session.id().to_owned(),
            state: session.phase().into(),
            entries: leaderboard_entries(session),
        }
    }
}

/// Ranked rows of `session`, highest score first.
pub fn leaderboard_entries(session: &Session) -> Vec<LeaderboardEntry> {
    session.leaderboard().into_iter().map(Into::into).collect()
}

/// Point-in-time view of a session, used by late joiners instead of event replay.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: String,
    /// Question category the session was created with.
    pub category_id: String,
    /// Lifecycle state.
    pub state: SessionStateDto,
    /// Set once the game finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReasonDto>,
    /// `-1` before the first round, number of rounds once finished.
    pub current_round_index: i64,
    /// Number of rounds in the game.
    pub total_rounds: usize,
    /// Round being played, without its answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_round: Option<RoundPublic>,
    /// RFC3339 deadline of the current round.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_deadline: Option<String>,
    /// Time left in the current round.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_remaining_ms: Option<u64>,
    /// Roster in join order.
    pub players: Vec<PlayerSummary>,
    /// Final standings, once finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaderboard: Option<Vec<LeaderboardEntry>>,
    /// Outcome of archiving, once attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_archived: Option<bool>,
    /// Sequence number of the last event this snapshot already reflects.
    pub last_seq: u64,
}

impl SessionSnapshot {
    /// Capture `session` as seen at `now`.
    pub fn new(session: &Session, now: Instant) -> Self {
        let phase = session.phase();
        let finish_reason = match phase {
            SessionPhase::Finished(reason) => Some(reason.into()),
            _ => None,
        };
        let current_round = session.current_round().map(|round| {
            RoundPublic::new(round, session.current_round_index().max(0) as usize)
        });

        Self {
            session_id: session.id().to_owned(),
            category_id: session.category_id().to_owned(),
            state: phase.into(),
            finish_reason,
            current_round_index: session.current_round_index(),
            total_rounds: session.rounds().len(),
            current_round,
            round_deadline: session.round_deadline_at().map(format_system_time),
            time_remaining_ms: session
                .time_remaining(now)
                .map(|remaining| remaining.as_millis() as u64),
            players: session.players().map(PlayerSummary::from).collect(),
            leaderboard: finish_reason.map(|_| leaderboard_entries(session)),
            results_archived: session.results_archived(),
            last_seq: session.last_seq(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn image_round() -> Round {
        Round {
            id: "art-2".into(),
            kind: RoundKind::ImageReveal {
                image_url: "https://picsum.photos/800/600".into(),
                max_blur_px: 24.0,
                prompt: None,
            },
            options: vec!["Monet".into(), "Van Gogh".into()],
            correct_option_index: 1,
            duration_ms: 30_000,
        }
    }

    #[test]
    fn public_round_never_leaks_the_answer() {
        let json = serde_json::to_value(RoundPublic::new(&image_round(), 0)).unwrap();
        assert_eq!(json["kind"], "IMAGE_REVEAL");
        assert_eq!(json["max_blur_px"], 24.0);
        assert!(json.get("correct_option_index").is_none());
        assert!(json.get("prompt").is_none());
    }

    #[test]
    fn snapshot_reports_remaining_time_of_the_running_round() {
        let mut session = Session::new("room-1", "art-design", vec![image_round()]).unwrap();
        session.add_player("alice", 20, SystemTime::now()).unwrap();
        let before = SessionSnapshot::new(&session, Instant::now());
        assert_eq!(before.current_round_index, -1);
        assert!(before.current_round.is_none());
        assert_eq!(before.state, SessionStateDto::Waiting);

        let started = Instant::now();
        session.start(started, SystemTime::now()).unwrap();
        let snapshot = SessionSnapshot::new(&session, started + Duration::from_secs(10));
        assert_eq!(snapshot.state, SessionStateDto::Active);
        assert_eq!(snapshot.current_round_index, 0);
        assert_eq!(snapshot.time_remaining_ms, Some(20_000));
        assert_eq!(snapshot.players.len(), 1);
        assert!(snapshot.leaderboard.is_none());
    }
}
