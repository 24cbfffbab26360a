use mongodb::bson::{Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::{
    PlayerResultEntity, SessionResultEntity, SettlementObligationEntity, obligation_key,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoResultDocument {
    #[serde(rename = "_id")]
    id: String,
    category_id: String,
    total_rounds: u32,
    finish_reason: String,
    finished_at_ms: i64,
    leaderboard: Vec<PlayerResultEntity>,
}

impl From<SessionResultEntity> for MongoResultDocument {
    fn from(value: SessionResultEntity) -> Self {
        Self {
            id: value.session_id,
            category_id: value.category_id,
            total_rounds: value.total_rounds,
            finish_reason: value.finish_reason,
            finished_at_ms: value.finished_at_ms,
            leaderboard: value.leaderboard,
        }
    }
}

impl From<MongoResultDocument> for SessionResultEntity {
    fn from(value: MongoResultDocument) -> Self {
        Self {
            session_id: value.id,
            category_id: value.category_id,
            total_rounds: value.total_rounds,
            finish_reason: value.finish_reason,
            finished_at_ms: value.finished_at_ms,
            leaderboard: value.leaderboard,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoObligationDocument {
    /// `{session_id}::{player}` so a retry overwrites the previous record.
    #[serde(rename = "_id")]
    id: String,
    #[serde(flatten)]
    obligation: SettlementObligationEntity,
}

impl From<SettlementObligationEntity> for MongoObligationDocument {
    fn from(obligation: SettlementObligationEntity) -> Self {
        Self {
            id: obligation.key(),
            obligation,
        }
    }
}

impl From<MongoObligationDocument> for SettlementObligationEntity {
    fn from(value: MongoObligationDocument) -> Self {
        value.obligation
    }
}

/// Filter on the `_id` field.
pub fn doc_id(id: &str) -> Document {
    doc! {"_id": id}
}

/// Filter matching one player's obligation.
pub fn obligation_doc_id(session_id: &str, player: &str) -> Document {
    doc_id(&obligation_key(session_id, player))
}
