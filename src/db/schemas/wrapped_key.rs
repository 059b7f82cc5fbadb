//! Wrapped key ledger schema
//!
//! Append-only record of every wrapped-key submission.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for wrapped key submissions
pub const WRAPPED_KEY_COLLECTION: &str = "wrappedKeys";

/// One wrapped-key submission
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WrappedKeyDoc {
    /// Generated on append
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub device_id: String,

    /// Opaque ciphertext as submitted
    pub wrapped_key: String,

    /// UTC submission time
    pub timestamp: DateTime,

    #[serde(default)]
    pub client_version: String,

    #[serde(default)]
    pub request_type: String,

    pub received_at: DateTime,

    /// `_id` of the owning device record
    pub associated_to: ObjectId,
}

impl WrappedKeyDoc {
    /// Build a submission for an existing device record
    pub fn new(
        device_id: impl Into<String>,
        wrapped_key: impl Into<String>,
        associated_to: ObjectId,
        client_version: impl Into<String>,
        request_type: impl Into<String>,
    ) -> Self {
        let now = DateTime::now();
        Self {
            id: None,
            device_id: device_id.into(),
            wrapped_key: wrapped_key.into(),
            timestamp: now,
            client_version: client_version.into(),
            request_type: request_type.into(),
            received_at: now,
            associated_to,
        }
    }
}

impl IntoIndexes for WrappedKeyDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "deviceId": 1, "receivedAt": 1 },
                Some(
                    IndexOptions::builder()
                        .name("device_received_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "associatedTo": 1 },
                Some(
                    IndexOptions::builder()
                        .name("associated_to_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
