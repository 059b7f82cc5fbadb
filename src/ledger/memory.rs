//! In-memory wrapped key ledger

use bson::oid::ObjectId;
use dashmap::DashMap;

use super::KeyExchangeLedger;
use crate::db::schemas::WrappedKeyDoc;
use crate::types::Result;

/// Submissions grouped by device ID, in append order
#[derive(Default)]
pub struct InMemoryKeyLedger {
    entries: DashMap<String, Vec<WrappedKeyDoc>>,
}

impl InMemoryKeyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of submissions across all devices
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl KeyExchangeLedger for InMemoryKeyLedger {
    async fn append(&self, mut entry: WrappedKeyDoc) -> Result<ObjectId> {
        let id = ObjectId::new();
        entry.id = Some(id);
        self.entries
            .entry(entry.device_id.clone())
            .or_default()
            .push(entry);
        Ok(id)
    }

    async fn history(&self, device_id: &str) -> Result<Vec<WrappedKeyDoc>> {
        Ok(self
            .entries
            .get(device_id)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }
}
