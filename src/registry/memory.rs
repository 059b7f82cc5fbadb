//! In-memory device registry
//!
//! Used in dev mode and by the test suites. Each `DashMap` entry is locked for
//! the duration of an upsert or update, which gives the same per-record
//! atomicity MongoDB provides for a single filter+update.

use dashmap::DashMap;

use super::{DevicePatch, DeviceRegistry, RegistrationFields};
use crate::db::schemas::DeviceDoc;
use crate::types::Result;

/// Device records keyed by device ID
#[derive(Default)]
pub struct InMemoryDeviceRegistry {
    devices: DashMap<String, DeviceDoc>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for InMemoryDeviceRegistry {
    async fn upsert(&self, device_id: &str, fields: RegistrationFields) -> Result<()> {
        let mut entry = self
            .devices
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceDoc::new(device_id));

        fields.apply_to(entry.value_mut());
        entry.connection_count += 1;
        Ok(())
    }

    async fn get(&self, device_id: &str) -> Result<Option<DeviceDoc>> {
        Ok(self.devices.get(device_id).map(|d| d.value().clone()))
    }

    async fn update_fields(&self, device_id: &str, patch: DevicePatch) -> Result<bool> {
        match self.devices.get_mut(device_id) {
            Some(mut device) => {
                patch.apply_to(device.value_mut());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{GeoInfo, MemorySnapshot, RetainedPrivateKey};
    use bson::DateTime;
    use std::sync::Arc;

    fn registration(hostname: &str) -> RegistrationFields {
        RegistrationFields {
            persistent_id: "persist-1".into(),
            hostname: hostname.into(),
            username: "ops".into(),
            os: "linux".into(),
            architecture: "arm64".into(),
            go_version: "go1.21.0".into(),
            num_cpu: 4,
            current_time: Some(DateTime::now()),
            working_dir: "/opt/agent".into(),
            geo: GeoInfo::default(),
            env_vars: vec!["LANG=C".into()],
            last_seen: DateTime::now(),
            registered_at: DateTime::now(),
            online: true,
        }
    }

    fn heartbeat(nonce: &str) -> DevicePatch {
        DevicePatch::heartbeat(
            DateTime::now(),
            GeoInfo::default(),
            "1h".into(),
            MemorySnapshot::default(),
            nonce.into(),
        )
    }

    #[tokio::test]
    async fn test_upsert_creates_then_merges() {
        let registry = InMemoryDeviceRegistry::new();

        registry.upsert("abc123", registration("host1")).await.unwrap();
        let first = registry.get("abc123").await.unwrap().unwrap();

        registry.upsert("abc123", registration("host2")).await.unwrap();
        let second = registry.get("abc123").await.unwrap().unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(second.hostname, "host2");
        assert_eq!(second.connection_count, 2);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.id, first.id);
        assert_eq!(second.heartbeat_count, 0);
    }

    #[tokio::test]
    async fn test_get_unknown_device_is_none() {
        let registry = InMemoryDeviceRegistry::new();
        assert!(registry.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_device_is_noop() {
        let registry = InMemoryDeviceRegistry::new();

        let matched = registry.update_fields("ghost", heartbeat("n")).await.unwrap();

        assert!(!matched);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_reregistration_clears_key_material() {
        let registry = InMemoryDeviceRegistry::new();
        registry.upsert("abc123", registration("host1")).await.unwrap();
        registry
            .update_fields(
                "abc123",
                DevicePatch::key_material(
                    DateTime::now(),
                    "public".into(),
                    RetainedPrivateKey::new("private"),
                ),
            )
            .await
            .unwrap();
        registry
            .update_fields("abc123", DevicePatch::wrapped_key(DateTime::now(), "W".into()))
            .await
            .unwrap();
        assert!(registry.get("abc123").await.unwrap().unwrap().has_keys());

        registry.upsert("abc123", registration("host1")).await.unwrap();

        let device = registry.get("abc123").await.unwrap().unwrap();
        assert!(device.public_key.is_empty());
        assert!(device.private_key.is_empty());
        assert!(device.wrapped_aes.is_none());
        assert_eq!(device.connection_count, 2);
    }

    #[tokio::test]
    async fn test_concurrent_heartbeats_are_counted() {
        let registry = Arc::new(InMemoryDeviceRegistry::new());
        registry.upsert("abc123", registration("host1")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .update_fields("abc123", heartbeat(&format!("n-{}", i)))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let device = registry.get("abc123").await.unwrap().unwrap();
        assert_eq!(device.heartbeat_count, 32);
    }

    #[tokio::test]
    async fn test_concurrent_registrations_are_counted() {
        let registry = Arc::new(InMemoryDeviceRegistry::new());

        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .upsert("abc123", registration(&format!("host-{}", i)))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let device = registry.get("abc123").await.unwrap().unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(device.connection_count, 32);
        assert_eq!(device.heartbeat_count, 0);
    }
}
