//! Client side of the external score settlement service.

mod http;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use thiserror::Error;

pub use http::HttpLedger;

/// Final score of one player, as handed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRequest {
    /// Game identifier submitted as `gameId`.
    pub session_id: String,
    /// Player identifier submitted as `playerAddress`.
    pub player: String,
    /// Final score.
    pub score: u32,
    /// Unix seconds.
    pub finish_time: i64,
}

/// Proof that the ledger accepted a score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    /// Hash of the recording transaction, when the ledger returns one.
    pub transaction_hash: Option<String>,
}

/// Failures reported while writing a final score.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to build ledger client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to reach ledger at `{endpoint}`")]
    RequestSend {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("ledger answered with status {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("failed to decode ledger response")]
    DecodeResponse {
        #[source]
        source: reqwest::Error,
    },
    #[error("ledger rejected the score: {0}")]
    Rejected(String),
}

/// External system of record for final scores.
pub trait SettlementLedger: Send + Sync {
    fn submit_final_score(
        &self,
        request: SettlementRequest,
    ) -> BoxFuture<'static, Result<SettlementReceipt, LedgerError>>;
}
