use std::time::SystemTime;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    options::IndexOptions,
};
use tracing::warn;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::connect,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{MongoGameDocument, doc_id},
};
use crate::{
    dao::{
        game_store::GameStore,
        storage::{StorageError, StorageResult},
    },
    state::{
        game::{Game, GameId, GameStatus},
        task::TaskType,
    },
};

pub(super) const GAME_COLLECTION_NAME: &str = "games";

/// Game store keeping one document per game, with the queried fields
/// duplicated at the top level for indexing.
#[derive(Clone)]
pub struct MongoGameStore {
    database: Database,
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_client, database) = connect(&config).await?;
        let store = Self { database };
        store.ensure_indexes().await?;
        Ok(store)
    }

    /// Handle on the underlying database, shared with the lock and tracker.
    pub fn database(&self) -> &Database {
        &self.database
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.database.collection::<Document>(GAME_COLLECTION_NAME);

        let active_pin = IndexModel::builder()
            .keys(doc! { "pin": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("active_pin_idx".to_owned()))
                    .unique(Some(true))
                    .partial_filter_expression(Some(doc! { "status": "active" }))
                    .build(),
            )
            .build();
        collection
            .create_index(active_pin)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: GAME_COLLECTION_NAME,
                index: "pin",
                source,
            })?;

        let lifecycle = IndexModel::builder()
            .keys(doc! { "status": 1, "task_type": 1, "updated": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("lifecycle_idx".to_owned()))
                    .build(),
            )
            .build();
        collection
            .create_index(lifecycle)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: GAME_COLLECTION_NAME,
                index: "status,task_type,updated",
                source,
            })?;

        Ok(())
    }

    fn collection(&self) -> Collection<MongoGameDocument> {
        self.database
            .collection::<MongoGameDocument>(GAME_COLLECTION_NAME)
    }

    async fn create_game(&self, game: Game) -> StorageResult<Game> {
        let document = MongoGameDocument::from(&game);
        match self.collection().insert_one(&document).await {
            Ok(_) => Ok(game),
            Err(err) if is_duplicate_key(&err) => Err(StorageError::Duplicate {
                what: format!("pin {}", game.pin),
            }),
            Err(source) => Err(MongoDaoError::InsertGame { id: game.id, source }.into()),
        }
    }

    async fn find_game(&self, id: GameId) -> StorageResult<Option<Game>> {
        let document = self
            .collection()
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadGame { id, source })?;
        document.map(decode_game).transpose()
    }

    async fn find_active_game_by_pin(&self, pin: String) -> StorageResult<Option<Game>> {
        let document = self
            .collection()
            .find_one(doc! { "pin": pin, "status": GameStatus::Active.as_str() })
            .await
            .map_err(|source| MongoDaoError::FindByPin { source })?;
        document.map(decode_game).transpose()
    }

    async fn save_game(&self, mut game: Game) -> StorageResult<Game> {
        let id = game.id;
        let expected = game.version;
        game.version += 1;
        let document = MongoGameDocument::from(&game);

        let result = self
            .collection()
            .replace_one(
                doc! { "_id": id.to_string(), "version": version_as_i64(expected) },
                &document,
            )
            .await
            .map_err(|source| MongoDaoError::SaveGame { id, source })?;
        if result.matched_count > 0 {
            return Ok(game);
        }

        let current = self
            .collection()
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadGame { id, source })?;
        match current {
            Some(current) => Err(StorageError::Conflict {
                id,
                expected,
                actual: u64::try_from(current.version).ok(),
            }),
            None => Err(StorageError::NotFound { id }),
        }
    }

    async fn find_stale(&self, filter: Document) -> StorageResult<Vec<GameId>> {
        let documents: Vec<Document> = self
            .database
            .collection::<Document>(GAME_COLLECTION_NAME)
            .find(filter)
            .projection(doc! { "_id": 1 })
            .await
            .map_err(|source| MongoDaoError::FindStale { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::FindStale { source })?;

        Ok(documents
            .iter()
            .filter_map(|document| {
                let raw = document.get_str("_id").ok()?;
                match Uuid::parse_str(raw) {
                    Ok(id) => Some(id),
                    Err(err) => {
                        warn!(id = raw, error = %err, "skipping game with malformed id");
                        None
                    }
                }
            })
            .collect())
    }

    async fn update_game_statuses(
        &self,
        ids: Vec<GameId>,
        status: GameStatus,
        before: SystemTime,
        now: SystemTime,
    ) -> StorageResult<u64> {
        if ids.is_empty() || status == GameStatus::Active {
            return Ok(0);
        }

        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let mut filter = doc! {
            "_id": { "$in": ids },
            "status": GameStatus::Active.as_str(),
            "updated": { "$lt": DateTime::from_system_time(before) },
        };
        let mut set = doc! {
            "status": status.as_str(),
            "game.status": status.as_str(),
            "updated": DateTime::from_system_time(now),
        };
        if status == GameStatus::Completed {
            filter.insert("task_type", TaskType::Podium.as_str());
            set.insert("game.current_task.status", "completed");
        } else {
            filter.insert(
                "task_type",
                doc! { "$nin": [TaskType::Podium.as_str(), TaskType::Quit.as_str()] },
            );
        }

        let result = self
            .collection()
            .update_many(filter, doc! { "$set": set, "$inc": { "version": 1 } })
            .await
            .map_err(|source| MongoDaoError::UpdateStatuses { source })?;
        Ok(result.modified_count)
    }

    async fn ping(&self) -> MongoResult<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }
}

fn decode_game(document: MongoGameDocument) -> StorageResult<Game> {
    let id = document.id.clone();
    document
        .into_game()
        .map_err(|reason| MongoDaoError::MalformedGame { id, reason }.into())
}

fn version_as_i64(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}

fn stale_podium_filter(before: SystemTime) -> Document {
    doc! {
        "status": GameStatus::Active.as_str(),
        "task_type": TaskType::Podium.as_str(),
        "updated": { "$lt": DateTime::from_system_time(before) },
    }
}

fn stale_active_filter(before: SystemTime) -> Document {
    doc! {
        "status": GameStatus::Active.as_str(),
        "task_type": { "$nin": [TaskType::Podium.as_str(), TaskType::Quit.as_str()] },
        "updated": { "$lt": DateTime::from_system_time(before) },
    }
}

impl GameStore for MongoGameStore {
    fn create_game(&self, game: Game) -> BoxFuture<'static, StorageResult<Game>> {
        let store = self.clone();
        Box::pin(async move { store.create_game(game).await })
    }

    fn find_game(&self, id: GameId) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game(id).await })
    }

    fn find_active_game_by_pin(
        &self,
        pin: String,
    ) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        let store = self.clone();
        Box::pin(async move { store.find_active_game_by_pin(pin).await })
    }

    fn save_game(&self, game: Game) -> BoxFuture<'static, StorageResult<Game>> {
        let store = self.clone();
        Box::pin(async move { store.save_game(game).await })
    }

    fn find_stale_podium_games(
        &self,
        before: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<GameId>>> {
        let store = self.clone();
        Box::pin(async move { store.find_stale(stale_podium_filter(before)).await })
    }

    fn find_stale_active_games(
        &self,
        before: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<GameId>>> {
        let store = self.clone();
        Box::pin(async move { store.find_stale(stale_active_filter(before)).await })
    }

    fn update_game_statuses(
        &self,
        ids: Vec<GameId>,
        status: GameStatus,
        before: SystemTime,
        now: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.update_game_statuses(ids, status, before, now).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}
