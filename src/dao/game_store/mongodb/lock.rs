use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;
use mongodb::{
    Collection, Database,
    bson::{DateTime, doc},
};
use uuid::Uuid;

use super::{
    error::{MongoDaoError, is_duplicate_key},
    models::MongoLockDocument,
};
use crate::dao::{lock::DistributedLock, storage::StorageResult};

const LOCK_COLLECTION_NAME: &str = "locks";

/// Lease lock stored as one document per key.
///
/// Acquiring upserts the key only when its lease lapsed or is already ours;
/// a live lease held by someone else makes the upsert collide on `_id`.
#[derive(Clone)]
pub struct MongoLock {
    collection: Collection<MongoLockDocument>,
    holder: String,
}

impl MongoLock {
    /// Lock over the `locks` collection of `database`, holding leases under a fresh holder id.
    pub fn new(database: &Database) -> Self {
        Self {
            collection: database.collection::<MongoLockDocument>(LOCK_COLLECTION_NAME),
            holder: Uuid::new_v4().to_string(),
        }
    }

    async fn acquire(&self, key: String, ttl: Duration) -> StorageResult<bool> {
        let now = SystemTime::now();
        let filter = doc! {
            "_id": key.as_str(),
            "$or": [
                { "expires_at": { "$lte": DateTime::from_system_time(now) } },
                { "holder": self.holder.as_str() },
            ],
        };
        let update = doc! {
            "$set": {
                "holder": self.holder.as_str(),
                "expires_at": DateTime::from_system_time(now + ttl),
            },
        };

        match self.collection.update_one(filter, update).upsert(true).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key(&err) => Ok(false),
            Err(source) => Err(MongoDaoError::Lock { key, source }.into()),
        }
    }

    async fn release(&self, key: String) -> StorageResult<()> {
        self.collection
            .delete_one(doc! { "_id": key.as_str(), "holder": self.holder.as_str() })
            .await
            .map_err(|source| MongoDaoError::Lock { key, source })?;
        Ok(())
    }
}

impl DistributedLock for MongoLock {
    fn try_acquire(&self, key: &str, ttl: Duration) -> BoxFuture<'static, StorageResult<bool>> {
        let lock = self.clone();
        let key = key.to_owned();
        Box::pin(async move { lock.acquire(key, ttl).await })
    }

    fn release(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let lock = self.clone();
        let key = key.to_owned();
        Box::pin(async move { lock.release(key).await })
    }
}
