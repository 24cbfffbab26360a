//! Process-local result store, used when no database is configured and in tests.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{
    models::{SessionResultEntity, SettlementObligationEntity, obligation_key},
    result_store::ResultStore,
    storage::StorageResult,
};

/// Result store keeping everything in concurrent maps. Contents vanish on restart.
#[derive(Clone, Default)]
pub struct MemoryResultStore {
    results: Arc<DashMap<String, SessionResultEntity>>,
    obligations: Arc<DashMap<String, SettlementObligationEntity>>,
}

impl MemoryResultStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryResultStore {
    fn save_result(&self, result: SessionResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.results.insert(result.session_id.clone(), result);
        Box::pin(async { Ok(()) })
    }

    fn find_result(
        &self,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionResultEntity>>> {
        let found = self
            .results
            .get(&session_id)
            .map(|entry| entry.value().clone());
        Box::pin(async move { Ok(found) })
    }

    fn save_obligation(
        &self,
        obligation: SettlementObligationEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.obligations.insert(obligation.key(), obligation);
        Box::pin(async { Ok(()) })
    }

    fn delete_obligation(
        &self,
        session_id: String,
        player: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.obligations
            .remove(&obligation_key(&session_id, &player));
        Box::pin(async { Ok(()) })
    }

    fn list_obligations(&self) -> BoxFuture<'static, StorageResult<Vec<SettlementObligationEntity>>> {
        let mut obligations: Vec<_> = self
            .obligations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        obligations.sort_by_key(|obligation| obligation.recorded_at_ms);
        Box::pin(async move { Ok(obligations) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
