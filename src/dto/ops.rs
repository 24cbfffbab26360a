use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::SettlementObligationEntity;

/// Final score that still has to reach the ledger.
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingSettlement {
    /// Finished session.
    pub session_id: String,
    /// Player owed a settlement.
    pub player: String,
    /// Final score to submit.
    pub score: u32,
    /// Unix seconds.
    pub finish_time: i64,
    /// Submissions tried so far.
    pub attempts: u32,
    /// Error of the latest attempt.
    pub last_error: String,
    /// When the obligation was recorded, unix milliseconds.
    pub recorded_at_ms: i64,
}

impl From<SettlementObligationEntity> for PendingSettlement {
    fn from(value: SettlementObligationEntity) -> Self {
        Self {
            session_id: value.session_id,
            player: value.player,
            score: value.score,
            finish_time: value.finish_time,
            attempts: value.attempts,
            last_error: value.last_error,
            recorded_at_ms: value.recorded_at_ms,
        }
    }
}

/// Listing returned by `GET /ops/settlements`.
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingSettlementsResponse {
    /// Oldest first.
    pub pending: Vec<PendingSettlement>,
}

/// Outcome of an operator-triggered retry.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SettlementRetryReport {
    /// Obligations submitted again.
    pub attempted: usize,
    /// Accepted by the ledger and cleared.
    pub settled: usize,
    /// Still failing; kept for the next retry.
    pub still_pending: usize,
}
