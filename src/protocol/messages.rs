//! Request and response bodies for the enrollment protocol
//!
//! Request fields are all optional on the wire; only malformed JSON or a
//! missing wrapped key is rejected. Devices that omit a field get its empty
//! value stored, matching how the agents have always been treated.

use bson::DateTime;
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::schemas::{GeoInfo, MemorySnapshot};
use crate::registry::RegistrationFields;
use crate::types::{GatehouseError, Result};

/// Status returned by a successful registration
pub const STATUS_REGISTERED: &str = "registered";

/// Status returned by a successful heartbeat
pub const STATUS_ALIVE: &str = "alive";

/// Status returned by a successful key submission
pub const STATUS_KEY_STORED: &str = "stored";

/// Parse a JSON request body, mapping any failure to a validation error
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(body)?)
}

// =============================================================================
// Requests
// =============================================================================

/// Identity snapshot sent at registration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub persistent_id: String,
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
    #[serde(default)]
    pub current_time: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    pub working_dir: String,
    #[serde(default)]
    pub geo: GeoInfo,
    /// Agents serialize an empty environment as `null`
    #[serde(default)]
    pub env_vars: Option<Vec<String>>,
}

impl RegisterRequest {
    /// Registry fields for this snapshot, stamped with `now`
    pub fn into_fields(self, now: DateTime) -> RegistrationFields {
        RegistrationFields {
            persistent_id: self.persistent_id,
            hostname: self.hostname,
            username: self.username,
            os: self.os,
            architecture: self.architecture,
            go_version: self.go_version,
            num_cpu: self.num_cpu,
            current_time: self.current_time.map(DateTime::from_chrono),
            working_dir: self.working_dir,
            geo: self.geo,
            env_vars: self.env_vars.unwrap_or_default(),
            last_seen: now,
            registered_at: now,
            online: true,
        }
    }
}

/// Periodic liveness report
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeartbeatRequest {
    #[serde(default)]
    pub geo: GeoInfo,
    #[serde(default)]
    pub uptime: String,
    #[serde(default)]
    pub mem: MemorySnapshot,
    /// Stored as reported; not checked for freshness or reuse
    #[serde(default)]
    pub nonce: String,
}

/// Wrapped key submission; the key lives at `data.wrappedKey`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WrappedKeyRequest {
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

impl WrappedKeyRequest {
    /// The submitted ciphertext, which must be a non-empty string
    pub fn wrapped_key(&self) -> Result<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.get("wrappedKey"))
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                GatehouseError::Validation("data.wrappedKey must be a non-empty string".into())
            })
    }
}

/// Informational headers recorded with each key submission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionMeta {
    pub client_version: String,
    pub request_type: String,
}

// =============================================================================
// Responses
// =============================================================================

/// Backoff devices should apply after a failed call, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub initial_delay: u64,
    pub max_delay: u64,
    pub backoff_factor: u32,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: 10,
            max_delay: 300,
            backoff_factor: 2,
            max_retries: 5,
        }
    }
}

/// Advisory schedule handed to devices; the server does not enforce it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinPolicy {
    /// Seconds between heartbeats
    pub heartbeat_interval: u64,
    pub retry_policy: RetryPolicy,
}

impl Default for CheckinPolicy {
    fn default() -> Self {
        Self {
            heartbeat_interval: 300,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Policy block plus the next expected check-in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinConfig {
    #[serde(flatten)]
    pub policy: CheckinPolicy,
    /// Unix epoch seconds
    pub next_checkin: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub status: String,
    pub config: CheckinConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySubmissionResponse {
    pub status: String,
    /// Unix epoch seconds of the next expected check-in
    pub next: i64,
}
