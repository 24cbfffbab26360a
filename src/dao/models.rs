use serde::{Deserialize, Serialize};

/// Variant discriminator of a question as stored in the question bank.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKindEntity {
    /// Plain text prompt.
    Text,
    /// Image progressively un-blurred while the round runs.
    ImageReveal,
}

/// Question definition read from the question bank.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionEntity {
    /// Identifier unique within its category; becomes the round identifier.
    pub id: String,
    /// Text or image-reveal question.
    pub kind: QuestionKindEntity,
    /// Prompt shown to players. Image-reveal questions may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Image revealed during the round (image-reveal only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Initial blur radius in pixels (image-reveal only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_blur_px: Option<f32>,
    /// Answer options in display order.
    pub options: Vec<String>,
    /// Index of the correct option inside `options`.
    pub correct_option_index: usize,
    /// Total time budget for the round.
    pub duration_ms: u64,
}

/// Final standing of a player as archived once a session finished.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerResultEntity {
    /// Wallet address or equivalent stable identifier.
    pub identifier: String,
    /// 1-based leaderboard rank.
    pub rank: u32,
    /// Final score.
    pub score: u32,
    /// Number of rounds answered correctly.
    pub correct_answers: u32,
    /// Join time in milliseconds since the unix epoch.
    pub joined_at_ms: i64,
}

/// Terminal leaderboard of a finished session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionResultEntity {
    /// Session identifier as supplied by clients.
    pub session_id: String,
    /// Category the rounds were drawn from.
    pub category_id: String,
    /// Number of rounds in the session.
    pub total_rounds: u32,
    /// Why the session finished (`rounds_consumed` or `all_players_finished`).
    pub finish_reason: String,
    /// Finish time in milliseconds since the unix epoch.
    pub finished_at_ms: i64,
    /// Players ordered by rank.
    pub leaderboard: Vec<PlayerResultEntity>,
}

/// Settlement write that could not be completed against the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettlementObligationEntity {
    /// Session the score belongs to.
    pub session_id: String,
    /// Player whose final score still has to be settled.
    pub player: String,
    /// Final score to submit.
    pub score: u32,
    /// Finish timestamp forwarded to the ledger (unix seconds).
    pub finish_time: i64,
    /// Attempts spent so far.
    pub attempts: u32,
    /// Last error reported by the ledger.
    pub last_error: String,
    /// Time the obligation was recorded, in milliseconds since the unix epoch.
    pub recorded_at_ms: i64,
}

impl SettlementObligationEntity {
    /// Stable key identifying the obligation of one player within one session.
    pub fn key(&self) -> String {
        obligation_key(&self.session_id, &self.player)
    }
}

/// Build the key used to index settlement obligations.
pub fn obligation_key(session_id: &str, player: &str) -> String {
    format!("{session_id}::{player}")
}
