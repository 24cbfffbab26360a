//! Shared fixtures for service tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::SystemTime,
};

use futures::future::BoxFuture;

use crate::{
    config::AppConfig,
    dao::{
        ledger::{LedgerError, SettlementLedger, SettlementReceipt, SettlementRequest},
        question_bank::StaticQuestionBank,
    },
    state::{AppState, SessionHandle, SharedState, session::Session},
};

pub const CATEGORY: &str = "technology";

const QUESTIONS: &str = r#"{
  "categories": {
    "technology": [
      {"id": "t1", "kind": "TEXT", "prompt": "One?", "options": ["a", "b", "c"], "correct_option_index": 0, "duration_ms": 30000},
      {"id": "t2", "kind": "IMAGE_REVEAL", "image_url": "https://example.org/2.png", "max_blur_px": 24.0, "options": ["a", "b"], "correct_option_index": 1, "duration_ms": 30000},
      {"id": "t3", "kind": "TEXT", "prompt": "Three?", "options": ["a", "b", "c", "d"], "correct_option_index": 2, "duration_ms": 30000}
    ],
    "science": [
      {"id": "s1", "kind": "TEXT", "prompt": "Water?", "options": ["H2O", "CO2"], "correct_option_index": 0, "duration_ms": 20000}
    ]
  }
}"#;

pub fn test_state(ledger: Option<Arc<dyn SettlementLedger>>) -> SharedState {
    test_state_with(AppConfig::default(), ledger)
}

pub fn test_state_with(config: AppConfig, ledger: Option<Arc<dyn SettlementLedger>>) -> SharedState {
    let questions = StaticQuestionBank::from_json(QUESTIONS).unwrap();
    AppState::new(config, Arc::new(questions), ledger)
}

/// Register a waiting session with the given roster, without evaluating the start condition.
pub async fn session_with_players(
    state: &SharedState,
    session_id: &str,
    players: &[&str],
) -> Arc<SessionHandle> {
    let rounds = state
        .questions()
        .questions(CATEGORY)
        .unwrap()
        .into_iter()
        .map(Into::into)
        .collect();
    let (handle, _) = state
        .registry()
        .get_or_create(session_id, || Session::new(session_id, CATEGORY, rounds))
        .unwrap();
    {
        let mut session = handle.lock().await;
        for player in players {
            session
                .add_player(player, usize::MAX, SystemTime::now())
                .unwrap();
        }
    }
    handle
}

/// Ledger double recording every submission and failing the first `failures` of them.
pub struct RecordingLedger {
    requests: Mutex<Vec<SettlementRequest>>,
    failures: AtomicU32,
}

impl RecordingLedger {
    pub fn accepting() -> Arc<Self> {
        Self::failing_first(0)
    }

    pub fn failing_first(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            failures: AtomicU32::new(failures),
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Self::failing_first(u32::MAX)
    }

    pub fn requests(&self) -> Vec<SettlementRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl SettlementLedger for RecordingLedger {
    fn submit_final_score(
        &self,
        request: SettlementRequest,
    ) -> BoxFuture<'static, Result<SettlementReceipt, LedgerError>> {
        self.requests.lock().unwrap().push(request);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        Box::pin(async move {
            if failed {
                Err(LedgerError::Rejected("execution reverted".into()))
            } else {
                Ok(SettlementReceipt {
                    transaction_hash: Some("0xfeed".into()),
                })
            }
        })
    }
}
