#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::models::{SessionResultEntity, SettlementObligationEntity};
use crate::dao::storage::StorageResult;

/// Durable archive for terminal leaderboards and unsettled scores.
pub trait ResultStore: Send + Sync {
    fn save_result(&self, result: SessionResultEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_result(
        &self,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionResultEntity>>>;
    fn save_obligation(
        &self,
        obligation: SettlementObligationEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn delete_obligation(
        &self,
        session_id: String,
        player: String,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn list_obligations(&self) -> BoxFuture<'static, StorageResult<Vec<SettlementObligationEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
