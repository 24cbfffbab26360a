use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{LedgerError, SettlementLedger, SettlementReceipt, SettlementRequest};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitScoreBody<'a> {
    game_id: &'a str,
    player_address: &'a str,
    score: u32,
    finish_time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitScoreResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Ledger reached over HTTP through the score submission endpoint.
#[derive(Clone)]
pub struct HttpLedger {
    client: Client,
    endpoint: Arc<str>,
}

impl HttpLedger {
    /// Client posting to `endpoint`, giving up on a request after `request_timeout`.
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|source| LedgerError::ClientBuilder { source })?;
        Ok(Self {
            client,
            endpoint: Arc::from(endpoint.into()),
        })
    }

    async fn submit(&self, request: SettlementRequest) -> Result<SettlementReceipt, LedgerError> {
        let body = SubmitScoreBody {
            game_id: &request.session_id,
            player_address: &request.player,
            score: request.score,
            finish_time: request.finish_time,
        };

        let response = self
            .client
            .post(self.endpoint.as_ref())
            .json(&body)
            .send()
            .await
            .map_err(|source| LedgerError::RequestSend {
                endpoint: self.endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<SubmitScoreResponse>()
                .await
                .ok()
                .and_then(|payload| payload.error)
                .unwrap_or_else(|| status.to_string());
            return Err(LedgerError::Status { status, message });
        }

        let payload = response
            .json::<SubmitScoreResponse>()
            .await
            .map_err(|source| LedgerError::DecodeResponse { source })?;

        if !payload.success {
            return Err(LedgerError::Rejected(
                payload.error.unwrap_or_else(|| "success flag not set".into()),
            ));
        }

        Ok(SettlementReceipt {
            transaction_hash: payload.transaction_hash,
        })
    }
}

impl SettlementLedger for HttpLedger {
    fn submit_final_score(
        &self,
        request: SettlementRequest,
    ) -> BoxFuture<'static, Result<SettlementReceipt, LedgerError>> {
        let ledger = self.clone();
        Box::pin(async move { ledger.submit(request).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_camel_case_field_names() {
        let body = SubmitScoreBody {
            game_id: "room-7",
            player_address: "0xabc",
            score: 320,
            finish_time: 1_700_000_123,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["gameId"], "room-7");
        assert_eq!(json["playerAddress"], "0xabc");
        assert_eq!(json["finishTime"], 1_700_000_123);
    }

    #[test]
    fn response_without_hash_still_parses() {
        let payload: SubmitScoreResponse =
            serde_json::from_str(r#"{"success": true, "message": "ok"}"#).unwrap();
        assert!(payload.success);
        assert!(payload.transaction_hash.is_none());
    }
}
