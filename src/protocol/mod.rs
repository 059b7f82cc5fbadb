//! Enrollment protocol
//!
//! The four device operations: register, provision keys, heartbeat and wrapped
//! key submission. Handlers are stateless over the injected stores; every
//! operation runs under a single deadline taken from [`ProtocolConfig`].
//!
//! Devices are expected to move through
//! `Unregistered -> Registered -> KeysProvisioned -> KeyWrapped`, but only
//! submission checks that a record exists. Provisioning and heartbeats for an
//! unknown device succeed without touching storage.

pub mod messages;
pub mod validator;

pub use messages::{
    CheckinConfig, CheckinPolicy, HeartbeatRequest, KeySubmissionResponse, RegisterRequest,
    RegisterResponse, RetryPolicy, StatusResponse, SubmissionMeta, WrappedKeyRequest,
};
pub use validator::{extract_device_id, optional_header, DeviceId};

use bson::DateTime;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::db::schemas::WrappedKeyDoc;
use crate::keys::KeyProvisioner;
use crate::ledger::KeyExchangeLedger;
use crate::registry::{DevicePatch, DeviceRegistry};
use crate::types::{GatehouseError, Result};
use messages::{parse_body, STATUS_ALIVE, STATUS_KEY_STORED, STATUS_REGISTERED};

/// Values threaded into the handlers at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Upper bound for one whole operation, storage calls included
    pub operation_timeout: Duration,
    /// Advisory policy returned at registration
    pub checkin: CheckinPolicy,
    /// Offset of `next_checkin` after registration
    pub registration_checkin: Duration,
    /// Offset of `next` after a key submission
    pub key_submission_checkin: Duration,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(10),
            checkin: CheckinPolicy::default(),
            registration_checkin: Duration::from_secs(5 * 60),
            key_submission_checkin: Duration::from_secs(60 * 60),
        }
    }
}

/// Epoch seconds `offset` from now
fn epoch_after(offset: Duration) -> i64 {
    let secs = i64::try_from(offset.as_secs()).unwrap_or(i64::MAX);
    Utc::now().timestamp().saturating_add(secs)
}

/// Protocol operations over a device registry and a key ledger
#[derive(Clone)]
pub struct ProtocolHandlers {
    registry: Arc<dyn DeviceRegistry>,
    ledger: Arc<dyn KeyExchangeLedger>,
    provisioner: KeyProvisioner,
    config: ProtocolConfig,
}

impl ProtocolHandlers {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        ledger: Arc<dyn KeyExchangeLedger>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            provisioner: KeyProvisioner::new(),
            config,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.config.operation_timeout
    }

    /// Run `fut` until `deadline`. Expiry drops the future, cancelling any
    /// storage call still in flight.
    async fn within<T, F>(&self, deadline: Instant, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(GatehouseError::Timeout(self.config.operation_timeout)),
        }
    }

    // =========================================================================
    // Register
    // =========================================================================

    /// Create or refresh the device record from an identity snapshot
    pub async fn register(&self, device_id: &DeviceId, body: &[u8]) -> Result<RegisterResponse> {
        let request: RegisterRequest = parse_body(body)?;
        let hostname = request.hostname.clone();

        let fields = request.into_fields(DateTime::now());
        self.within(
            self.deadline(),
            self.registry.upsert(device_id.as_str(), fields),
        )
        .await?;

        info!(device_id = %device_id, hostname = %hostname, "Device registered");

        Ok(RegisterResponse {
            status: STATUS_REGISTERED.to_string(),
            config: CheckinConfig {
                policy: self.config.checkin.clone(),
                next_checkin: epoch_after(self.config.registration_checkin),
            },
        })
    }

    // =========================================================================
    // Provision Keys
    // =========================================================================

    /// Issue a fresh keypair, retain both halves and return the public PEM
    pub async fn provision_keys(&self, device_id: &DeviceId) -> Result<String> {
        self.within(self.deadline(), async {
            let keys = self.provisioner.generate_async().await?;
            let patch = DevicePatch::key_material(
                DateTime::now(),
                keys.public_pem.clone(),
                keys.private_pem,
            );

            let matched = self.registry.update_fields(device_id.as_str(), patch).await?;
            if matched {
                info!(device_id = %device_id, "Provisioned device keypair");
            } else {
                warn!(
                    device_id = %device_id,
                    "Issued keypair to unregistered device; nothing was retained"
                );
            }

            Ok(keys.public_pem)
        })
        .await
    }

    // =========================================================================
    // Heartbeat
    // =========================================================================

    /// Record a liveness report
    pub async fn heartbeat(&self, device_id: &DeviceId, body: &[u8]) -> Result<StatusResponse> {
        let request: HeartbeatRequest = parse_body(body)?;

        let patch = DevicePatch::heartbeat(
            DateTime::now(),
            request.geo,
            request.uptime,
            request.mem,
            request.nonce,
        );
        let matched = self
            .within(
                self.deadline(),
                self.registry.update_fields(device_id.as_str(), patch),
            )
            .await?;

        if !matched {
            debug!(device_id = %device_id, "Heartbeat from unregistered device ignored");
        }

        Ok(StatusResponse {
            status: STATUS_ALIVE.to_string(),
        })
    }

    // =========================================================================
    // Submit Wrapped Key
    // =========================================================================

    /// Append a wrapped key to the ledger and refresh the cached copy
    pub async fn submit_wrapped_key(
        &self,
        device_id: &DeviceId,
        body: &[u8],
        meta: SubmissionMeta,
    ) -> Result<KeySubmissionResponse> {
        let deadline = self.deadline();

        let wrapped = self
            .within(deadline, async {
                let device = self
                    .registry
                    .get(device_id.as_str())
                    .await?
                    .ok_or_else(|| GatehouseError::NotFound(format!("device {device_id}")))?;

                let request: WrappedKeyRequest = parse_body(body)?;
                let wrapped = request.wrapped_key()?.to_string();

                let owner = device.id.ok_or_else(|| {
                    GatehouseError::Internal(format!("Device record {device_id} has no _id"))
                })?;

                let entry = WrappedKeyDoc::new(
                    device_id.as_str(),
                    wrapped.clone(),
                    owner,
                    meta.client_version,
                    meta.request_type,
                );
                let entry_id = self.ledger.append(entry).await?;
                info!(device_id = %device_id, entry_id = %entry_id, "Recorded wrapped key");

                Ok(wrapped)
            })
            .await?;

        // The ledger entry is authoritative; the cached copy may lag.
        let patch = DevicePatch::wrapped_key(DateTime::now(), wrapped);
        match self
            .within(
                deadline,
                self.registry.update_fields(device_id.as_str(), patch),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(device_id = %device_id, "Device vanished before wrapped key cache update")
            }
            Err(e) => warn!(device_id = %device_id, error = %e, "Wrapped key cache update failed"),
        }

        Ok(KeySubmissionResponse {
            status: STATUS_KEY_STORED.to_string(),
            next: epoch_after(self.config.key_submission_checkin),
        })
    }
}
