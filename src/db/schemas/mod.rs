//! Database schemas for Gatehouse
//!
//! Defines MongoDB document structures for devices and the wrapped key ledger.

mod device;
mod wrapped_key;

pub use device::{
    DeviceDoc, GeoInfo, MemorySnapshot, RetainedPrivateKey, DEVICE_COLLECTION,
};
pub use wrapped_key::{WrappedKeyDoc, WRAPPED_KEY_COLLECTION};
