//! MongoDB-backed device registry

use bson::{doc, DateTime};
use tracing::debug;

use super::{DevicePatch, DeviceRegistry, RegistrationFields};
use crate::db::schemas::{DeviceDoc, DEVICE_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::Result;

/// Device registry backed by the `devices` collection
pub struct MongoDeviceRegistry {
    collection: MongoCollection<DeviceDoc>,
}

impl MongoDeviceRegistry {
    /// Open the collection and ensure its indexes
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        let collection = mongo.collection::<DeviceDoc>(DEVICE_COLLECTION).await?;
        Ok(Self { collection })
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for MongoDeviceRegistry {
    async fn upsert(&self, device_id: &str, fields: RegistrationFields) -> Result<()> {
        let update = doc! {
            "$set": fields.to_set(device_id)?,
            "$setOnInsert": RegistrationFields::insert_defaults(DateTime::now()),
            "$inc": { "connectionCount": 1_i64 },
        };

        let result = self
            .collection
            .upsert_one(doc! { "deviceId": device_id }, update)
            .await?;

        if result.upserted_id.is_some() {
            debug!(device_id, "Inserted new device record");
        }

        Ok(())
    }

    async fn get(&self, device_id: &str) -> Result<Option<DeviceDoc>> {
        self.collection.find_one(doc! { "deviceId": device_id }).await
    }

    async fn update_fields(&self, device_id: &str, patch: DevicePatch) -> Result<bool> {
        if patch.is_empty() {
            return Ok(self.get(device_id).await?.is_some());
        }

        let update = patch.to_update()?;
        let result = self
            .collection
            .update_one(doc! { "deviceId": device_id }, update)
            .await?;

        Ok(result.matched_count > 0)
    }
}
