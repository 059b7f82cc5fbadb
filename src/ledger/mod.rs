//! Wrapped key ledger
//!
//! Append-only history of wrapped-key submissions. Entries are never updated
//! or removed; the `wrappedAes` field on the device record is only a cache of
//! the latest entry and may lag behind it.

pub mod memory;
pub mod mongo;

pub use memory::InMemoryKeyLedger;
pub use mongo::MongoKeyLedger;

use bson::oid::ObjectId;

use crate::db::schemas::WrappedKeyDoc;
use crate::types::Result;

/// Storage operations for wrapped key submissions
#[async_trait::async_trait]
pub trait KeyExchangeLedger: Send + Sync {
    /// Append a submission, returning its generated ID
    async fn append(&self, entry: WrappedKeyDoc) -> Result<ObjectId>;

    /// Read-only inspection of all submissions for a device, oldest first.
    ///
    /// No protocol operation reads this; it exists for operators and tests.
    async fn history(&self, device_id: &str) -> Result<Vec<WrappedKeyDoc>>;
}
