//! MongoDB-backed wrapped key ledger

use bson::{doc, oid::ObjectId};

use super::KeyExchangeLedger;
use crate::db::schemas::{WrappedKeyDoc, WRAPPED_KEY_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::Result;

/// Ledger backed by the `wrappedKeys` collection
pub struct MongoKeyLedger {
    collection: MongoCollection<WrappedKeyDoc>,
}

impl MongoKeyLedger {
    /// Open the collection and ensure its indexes
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo
            .collection::<WrappedKeyDoc>(WRAPPED_KEY_COLLECTION)
            .await?;
        Ok(Self { collection })
    }
}

#[async_trait::async_trait]
impl KeyExchangeLedger for MongoKeyLedger {
    async fn append(&self, entry: WrappedKeyDoc) -> Result<ObjectId> {
        self.collection.insert_one(entry).await
    }

    async fn history(&self, device_id: &str) -> Result<Vec<WrappedKeyDoc>> {
        self.collection
            .find_many(doc! { "deviceId": device_id }, doc! { "receivedAt": 1, "_id": 1 })
            .await
    }
}
