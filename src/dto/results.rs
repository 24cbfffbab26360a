use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::{PlayerResultEntity, SessionResultEntity};

/// Archived leaderboard row.
#[derive(Debug, Serialize, ToSchema)]
pub struct ArchivedStanding {
    /// 1-based final position.
    pub rank: u32,
    /// Player identifier.
    pub identifier: String,
    /// Final score.
    pub score: u32,
    /// Rounds answered correctly.
    pub correct_answers: u32,
    /// First join, unix milliseconds.
    pub joined_at_ms: i64,
}

impl From<PlayerResultEntity> for ArchivedStanding {
    fn from(value: PlayerResultEntity) -> Self {
        Self {
            rank: value.rank,
            identifier: value.identifier,
            score: value.score,
            correct_answers: value.correct_answers,
            joined_at_ms: value.joined_at_ms,
        }
    }
}

/// Final leaderboard of a finished session, served after it left memory.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResultResponse {
    /// Session identifier.
    pub session_id: String,
    /// Question category played.
    pub category_id: String,
    /// Number of rounds in the game.
    pub total_rounds: u32,
    /// `rounds_consumed` or `all_players_finished`.
    pub finish_reason: String,
    /// Finish time, unix milliseconds.
    pub finished_at_ms: i64,
    /// Final standings by rank.
    pub leaderboard: Vec<ArchivedStanding>,
}

impl From<SessionResultEntity> for SessionResultResponse {
    fn from(value: SessionResultEntity) -> Self {
        Self {
            session_id: value.session_id,
            category_id: value.category_id,
            total_rounds: value.total_rounds,
            finish_reason: value.finish_reason,
            finished_at_ms: value.finished_at_ms,
            leaderboard: value.leaderboard.into_iter().map(Into::into).collect(),
        }
    }
}
