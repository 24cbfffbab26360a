use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Client, Collection, Database, IndexModel, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoObligationDocument, MongoResultDocument, doc_id, obligation_doc_id},
};
use crate::dao::{
    models::{SessionResultEntity, SettlementObligationEntity, obligation_key},
    result_store::ResultStore,
    storage::StorageResult,
};

const RESULT_COLLECTION_NAME: &str = "session_results";
const OBLIGATION_COLLECTION_NAME: &str = "settlement_obligations";

#[derive(Clone)]
pub struct MongoResultStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoResultStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let index = IndexModel::builder()
            .keys(doc! {"finished_at_ms": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("result_finished_idx".to_owned()))
                    .build(),
            )
            .build();
        self.results()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RESULT_COLLECTION_NAME,
                index: "finished_at_ms",
                source,
            })?;

        let index = IndexModel::builder()
            .keys(doc! {"session_id": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("obligation_session_idx".to_owned()))
                    .build(),
            )
            .build();
        self.obligations()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: OBLIGATION_COLLECTION_NAME,
                index: "session_id",
                source,
            })?;

        Ok(())
    }

    async fn results(&self) -> Collection<MongoResultDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoResultDocument>(RESULT_COLLECTION_NAME)
    }

    async fn obligations(&self) -> Collection<MongoObligationDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoObligationDocument>(OBLIGATION_COLLECTION_NAME)
    }

    async fn save_result(&self, result: SessionResultEntity) -> MongoResult<()> {
        let session_id = result.session_id.clone();
        let document: MongoResultDocument = result.into();
        self.results()
            .await
            .replace_one(doc_id(&session_id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveResult { session_id, source })?;
        Ok(())
    }

    async fn find_result(&self, session_id: String) -> MongoResult<Option<SessionResultEntity>> {
        let document = self
            .results()
            .await
            .find_one(doc_id(&session_id))
            .await
            .map_err(|source| MongoDaoError::LoadResult { session_id, source })?;
        Ok(document.map(Into::into))
    }

    async fn save_obligation(&self, obligation: SettlementObligationEntity) -> MongoResult<()> {
        let key = obligation.key();
        let document: MongoObligationDocument = obligation.into();
        self.obligations()
            .await
            .replace_one(doc_id(&key), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveObligation { key, source })?;
        Ok(())
    }

    async fn delete_obligation(&self, session_id: String, player: String) -> MongoResult<()> {
        self.obligations()
            .await
            .delete_one(obligation_doc_id(&session_id, &player))
            .await
            .map_err(|source| MongoDaoError::DeleteObligation {
                key: obligation_key(&session_id, &player),
                source,
            })?;
        Ok(())
    }

    async fn list_obligations(&self) -> MongoResult<Vec<SettlementObligationEntity>> {
        let documents: Vec<MongoObligationDocument> = self
            .obligations()
            .await
            .find(doc! {})
            .sort(doc! {"recorded_at_ms": 1})
            .await
            .map_err(|source| MongoDaoError::ListObligations { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListObligations { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }
}

impl ResultStore for MongoResultStore {
    fn save_result(&self, result: SessionResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_result(result).await.map_err(Into::into) })
    }

    fn find_result(
        &self,
        session_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionResultEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_result(session_id).await.map_err(Into::into) })
    }

    fn save_obligation(
        &self,
        obligation: SettlementObligationEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_obligation(obligation).await.map_err(Into::into) })
    }

    fn delete_obligation(
        &self,
        session_id: String,
        player: String,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_obligation(session_id, player)
                .await
                .map_err(Into::into)
        })
    }

    fn list_obligations(&self) -> BoxFuture<'static, StorageResult<Vec<SettlementObligationEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_obligations().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
