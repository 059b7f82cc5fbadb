//! Request identity validation
//!
//! Pure header inspection; no storage is touched before this succeeds.

use hyper::HeaderMap;
use std::fmt;

use crate::types::{GatehouseError, Result};

/// Header carrying the caller's device identity
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// Header carrying the agent build version on key submission
pub const CLIENT_VERSION_HEADER: &str = "x-client-version";

/// Header carrying the submission kind on key submission
pub const REQUEST_TYPE_HEADER: &str = "r-type";

/// Opaque, caller-supplied device identity
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Accept any non-blank value
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GatehouseError::MissingIdentity);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the device identity from request headers
pub fn extract_device_id(headers: &HeaderMap) -> Result<DeviceId> {
    let value = headers
        .get(DEVICE_ID_HEADER)
        .ok_or(GatehouseError::MissingIdentity)?;

    let raw = value.to_str().map_err(|_| GatehouseError::MissingIdentity)?;
    DeviceId::parse(raw)
}

/// Read an optional informational header, empty when absent or not text
pub fn optional_header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
