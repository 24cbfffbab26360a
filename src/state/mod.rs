pub mod registry;
pub mod round;
pub mod scoring;
pub mod session;
pub mod state_machine;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::{
        ledger::SettlementLedger, models::SettlementObligationEntity, question_bank::QuestionBank,
        result_store::ResultStore,
    },
    error::ServiceError,
};

pub use self::registry::{SessionHandle, SessionRegistry};

/// Shared handle passed to routes and background tasks.
pub type SharedState = Arc<AppState>;

/// Central application state: live sessions, collaborators and storage handles.
pub struct AppState {
    config: AppConfig,
    registry: SessionRegistry,
    questions: Arc<dyn QuestionBank>,
    ledger: Option<Arc<dyn SettlementLedger>>,
    result_store: RwLock<Option<Arc<dyn ResultStore>>>,
    degraded: watch::Sender<bool>,
    settlements: DashMap<String, SettlementObligationEntity>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a result store is installed.
    pub fn new(
        config: AppConfig,
        questions: Arc<dyn QuestionBank>,
        ledger: Option<Arc<dyn SettlementLedger>>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            registry: SessionRegistry::new(),
            questions,
            ledger,
            result_store: RwLock::new(None),
            degraded: degraded_tx,
            settlements: DashMap::new(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Live sessions.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Question source for new sessions.
    pub fn questions(&self) -> &dyn QuestionBank {
        self.questions.as_ref()
    }

    /// Score settlement client, when one is configured.
    pub fn ledger(&self) -> Option<Arc<dyn SettlementLedger>> {
        self.ledger.clone()
    }

    /// Settlement obligations not yet accepted by the ledger, keyed by session and player.
    pub fn pending_settlements(&self) -> &DashMap<String, SettlementObligationEntity> {
        &self.settlements
    }

    /// Obtain a handle to the current result store, if one is installed.
    pub async fn result_store(&self) -> Option<Arc<dyn ResultStore>> {
        let guard = self.result_store.read().await;
        guard.as_ref().cloned()
    }

    /// Like [`Self::result_store`], failing with [`ServiceError::Degraded`] when none is installed.
    pub async fn require_result_store(&self) -> Result<Arc<dyn ResultStore>, ServiceError> {
        self.result_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new result store implementation and leave degraded mode.
    pub async fn set_result_store(&self, store: Arc<dyn ResultStore>) {
        {
            let mut guard = self.result_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}
