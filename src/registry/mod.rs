//! Device registry
//!
//! Persistent per-device records behind a trait so the protocol can run
//! against MongoDB in production and an in-memory map in dev mode and tests.
//!
//! Semantics shared by every implementation:
//! - `upsert` merges the registration snapshot, clears any key material,
//!   applies insert-only defaults and bumps `connectionCount` in one atomic
//!   step.
//! - `get` returns `None` for unknown devices.
//! - `update_fields` only touches an existing record. An unknown device is a
//!   successful no-op that reports `false`.

pub mod memory;
pub mod mongo;

pub use memory::InMemoryDeviceRegistry;
pub use mongo::MongoDeviceRegistry;

use bson::{doc, DateTime, Document};
use serde::Serialize;

use crate::db::schemas::{DeviceDoc, GeoInfo, MemorySnapshot, RetainedPrivateKey};
use crate::types::Result;

/// Storage operations for device records
#[async_trait::async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Insert or merge a registration, incrementing `connectionCount`
    async fn upsert(&self, device_id: &str, fields: RegistrationFields) -> Result<()>;

    /// Look up a device record
    async fn get(&self, device_id: &str) -> Result<Option<DeviceDoc>>;

    /// Best-effort partial update; returns whether a record matched
    async fn update_fields(&self, device_id: &str, patch: DevicePatch) -> Result<bool>;
}

/// Identity snapshot written on every registration.
///
/// Registration also clears any key material: a device that registers again
/// starts over and must provision a new keypair.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationFields {
    pub persistent_id: String,
    pub hostname: String,
    pub username: String,
    pub os: String,
    pub architecture: String,
    /// Runtime version of the device agent
    pub go_version: String,
    pub num_cpu: i32,
    pub current_time: Option<DateTime>,
    pub working_dir: String,
    pub geo: GeoInfo,
    pub env_vars: Vec<String>,
    pub last_seen: DateTime,
    pub registered_at: DateTime,
    pub online: bool,
}

impl RegistrationFields {
    /// Overwrite the listed fields on an in-memory record
    pub fn apply_to(self, device: &mut DeviceDoc) {
        device.persistent_id = self.persistent_id;
        device.hostname = self.hostname;
        device.username = self.username;
        device.os = self.os;
        device.architecture = self.architecture;
        device.go_version = self.go_version;
        device.num_cpu = self.num_cpu;
        device.current_time = self.current_time;
        device.working_dir = self.working_dir;
        device.geo = self.geo;
        device.env_vars = self.env_vars;
        device.last_seen = Some(self.last_seen);
        device.registered_at = Some(self.registered_at);
        device.online = self.online;
        device.public_key.clear();
        device.private_key = RetainedPrivateKey::default();
        device.wrapped_aes = None;
    }

    /// `$set` document for an upsert of `device_id`
    pub fn to_set(&self, device_id: &str) -> Result<Document> {
        let mut set = bson::to_document(self)?;
        set.insert("deviceId", device_id);
        set.extend(Self::cleared_key_material());
        Ok(set)
    }

    /// Key material reset by every registration
    pub fn cleared_key_material() -> Document {
        doc! {
            "publicKey": "",
            "privateKey": "",
            "wrappedAes": bson::Bson::Null,
        }
    }

    /// Fields written only when the upsert creates the record
    pub fn insert_defaults(now: DateTime) -> Document {
        doc! {
            "createdAt": now,
            "heartbeatCount": 0_i64,
        }
    }
}

/// Partial update for an existing device.
///
/// Unset fields are left untouched; `heartbeat_increment` is applied atomically
/// alongside the overwrites.
#[derive(Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DevicePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemorySnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_at: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<RetainedPrivateKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_key_update: Option<DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrapped_aes: Option<String>,
    #[serde(skip)]
    pub heartbeat_increment: i64,
}

impl DevicePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Liveness report from a heartbeat
    pub fn heartbeat(
        now: DateTime,
        geo: GeoInfo,
        uptime: String,
        memory: MemorySnapshot,
        nonce: String,
    ) -> Self {
        Self {
            last_seen: Some(now),
            geo: Some(geo),
            uptime: Some(uptime),
            memory: Some(memory),
            last_nonce: Some(nonce),
            last_update_at: Some(now),
            heartbeat_increment: 1,
            ..Self::default()
        }
    }

    /// Freshly provisioned key material
    pub fn key_material(now: DateTime, public_key: String, private_key: RetainedPrivateKey) -> Self {
        Self {
            public_key: Some(public_key),
            private_key: Some(private_key),
            last_key_update: Some(now),
            ..Self::default()
        }
    }

    /// Cached copy of the latest wrapped key
    pub fn wrapped_key(now: DateTime, wrapped_key: String) -> Self {
        Self {
            last_seen: Some(now),
            wrapped_aes: Some(wrapped_key),
            ..Self::default()
        }
    }

    /// Whether applying the patch would change nothing
    pub fn is_empty(&self) -> bool {
        self.heartbeat_increment == 0
            && self.last_seen.is_none()
            && self.geo.is_none()
            && self.uptime.is_none()
            && self.memory.is_none()
            && self.last_nonce.is_none()
            && self.last_update_at.is_none()
            && self.public_key.is_none()
            && self.private_key.is_none()
            && self.last_key_update.is_none()
            && self.wrapped_aes.is_none()
    }

    /// Apply to an in-memory record
    pub fn apply_to(self, device: &mut DeviceDoc) {
        if let Some(v) = self.last_seen {
            device.last_seen = Some(v);
        }
        if let Some(v) = self.geo {
            device.geo = v;
        }
        if let Some(v) = self.uptime {
            device.uptime = Some(v);
        }
        if let Some(v) = self.memory {
            device.memory = Some(v);
        }
        if let Some(v) = self.last_nonce {
            device.last_nonce = Some(v);
        }
        if let Some(v) = self.last_update_at {
            device.last_update_at = Some(v);
        }
        if let Some(v) = self.public_key {
            device.public_key = v;
        }
        if let Some(v) = self.private_key {
            device.private_key = v;
        }
        if let Some(v) = self.last_key_update {
            device.last_key_update = Some(v);
        }
        if let Some(v) = self.wrapped_aes {
            device.wrapped_aes = Some(v);
        }
        device.heartbeat_count += self.heartbeat_increment;
    }

    /// Render as a MongoDB update document (`$set` / `$inc`)
    pub fn to_update(&self) -> Result<Document> {
        let set = bson::to_document(self)?;
        let mut update = Document::new();
        if !set.is_empty() {
            update.insert("$set", set);
        }
        if self.heartbeat_increment != 0 {
            update.insert("$inc", doc! { "heartbeatCount": self.heartbeat_increment });
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_patch_renders_set_and_inc() {
        let patch = DevicePatch::heartbeat(
            DateTime::now(),
            GeoInfo {
                city: "Lisbon".into(),
                ..GeoInfo::default()
            },
            "3h12m".into(),
            MemorySnapshot {
                total: 16,
                used: 8,
                proc: 1,
            },
            "n-1".into(),
        );

        let update = patch.to_update().unwrap();
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("lastNonce").unwrap(), "n-1");
        assert_eq!(set.get_str("uptime").unwrap(), "3h12m");
        assert!(set.contains_key("lastUpdateAt"));
        assert!(!set.contains_key("publicKey"));
        assert_eq!(
            update.get_document("$inc").unwrap().get_i64("heartbeatCount").unwrap(),
            1
        );
    }

    #[test]
    fn test_wrapped_key_patch_has_no_increment() {
        let update = DevicePatch::wrapped_key(DateTime::now(), "blob".into())
            .to_update()
            .unwrap();
        assert!(!update.contains_key("$inc"));
        assert_eq!(
            update.get_document("$set").unwrap().get_str("wrappedAes").unwrap(),
            "blob"
        );
    }

    #[test]
    fn test_empty_patch() {
        let patch = DevicePatch::new();
        assert!(patch.is_empty());
        assert!(patch.to_update().unwrap().is_empty());
    }

    fn registration() -> RegistrationFields {
        RegistrationFields {
            persistent_id: "p-1".into(),
            hostname: "host1".into(),
            username: "ops".into(),
            os: "linux".into(),
            architecture: "amd64".into(),
            go_version: "go1.22.4".into(),
            num_cpu: 4,
            current_time: None,
            working_dir: "/srv".into(),
            geo: GeoInfo::default(),
            env_vars: vec![],
            last_seen: DateTime::now(),
            registered_at: DateTime::now(),
            online: true,
        }
    }

    #[test]
    fn test_registration_leaves_counters_alone() {
        let mut device = DeviceDoc::new("abc123");
        device.heartbeat_count = 7;
        let created = device.created_at;

        registration().apply_to(&mut device);

        assert_eq!(device.hostname, "host1");
        assert_eq!(device.go_version, "go1.22.4");
        assert_eq!(device.heartbeat_count, 7);
        assert_eq!(device.created_at, created);
        assert!(device.online);
    }

    #[test]
    fn test_registration_clears_key_material() {
        let mut device = DeviceDoc::new("abc123");
        device.public_key = "public".into();
        device.private_key = RetainedPrivateKey::new("private");
        device.wrapped_aes = Some("W".into());

        registration().apply_to(&mut device);

        assert!(!device.has_keys());
        assert!(device.public_key.is_empty());
        assert!(device.wrapped_aes.is_none());
    }

    #[test]
    fn test_registration_set_document_resets_keys() {
        let set = registration().to_set("abc123").unwrap();

        assert_eq!(set.get_str("deviceId").unwrap(), "abc123");
        assert_eq!(set.get_str("goVersion").unwrap(), "go1.22.4");
        assert_eq!(set.get_str("publicKey").unwrap(), "");
        assert_eq!(set.get_str("privateKey").unwrap(), "");
        assert_eq!(set.get("wrappedAes"), Some(&bson::Bson::Null));
        assert!(!set.contains_key("createdAt"));
        assert!(!set.contains_key("heartbeatCount"));

        let defaults = RegistrationFields::insert_defaults(DateTime::now());
        assert!(defaults.contains_key("createdAt"));
        assert!(!defaults.contains_key("publicKey"));
    }
}
