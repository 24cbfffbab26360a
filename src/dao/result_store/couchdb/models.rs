use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::models::{SessionResultEntity, SettlementObligationEntity, obligation_key};

/// Id prefix of archived results.
pub const RESULT_PREFIX: &str = "result::";
/// Id prefix of pending settlement obligations.
pub const OBLIGATION_PREFIX: &str = "settlement::";
/// Upper bound appended to a prefix for `_all_docs` range scans.
pub const END_SUFFIX: &str = "\u{ffff}";

/// Body of an `_all_docs?include_docs=true` query.
#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

/// One row of an `_all_docs` listing.
#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Minimal view of a document, used to fetch the current revision before overwriting.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

/// Archived result as stored in CouchDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchResultDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub result: SessionResultEntity,
}

impl CouchResultDocument {
    /// Wrap `result`, overwriting revision `rev` when present.
    pub fn new(result: SessionResultEntity, rev: Option<String>) -> Self {
        Self {
            id: result_doc_id(&result.session_id),
            rev,
            result,
        }
    }
}

/// Settlement obligation as stored in CouchDB.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchObligationDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub obligation: SettlementObligationEntity,
}

impl CouchObligationDocument {
    /// Wrap `obligation`, overwriting revision `rev` when present.
    pub fn new(obligation: SettlementObligationEntity, rev: Option<String>) -> Self {
        Self {
            id: format!("{OBLIGATION_PREFIX}{}", obligation.key()),
            rev,
            obligation,
        }
    }
}

/// Document id of a session's archived result.
pub fn result_doc_id(session_id: &str) -> String {
    format!("{RESULT_PREFIX}{session_id}")
}

/// Document id of a player's pending obligation.
pub fn obligation_doc_id(session_id: &str, player: &str) -> String {
    format!("{OBLIGATION_PREFIX}{}", obligation_key(session_id, player))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_flatten_entities_next_to_couch_metadata() {
        let doc = CouchObligationDocument::new(
            SettlementObligationEntity {
                session_id: "room-1".into(),
                player: "0xabc".into(),
                score: 180,
                finish_time: 1_700_000_000,
                attempts: 5,
                last_error: "timeout".into(),
                recorded_at_ms: 1,
            },
            None,
        );
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["_id"], "settlement::room-1::0xabc");
        assert_eq!(json["score"], 180);
        assert!(json.get("_rev").is_none());
        assert_eq!(doc.id, obligation_doc_id("room-1", "0xabc"));
    }
}
