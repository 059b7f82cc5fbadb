//! Configuration for Gatehouse
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::{CheckinPolicy, ProtocolConfig, RetryPolicy};

/// Gatehouse - device enrollment and key escrow gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "gatehouse")]
#[command(about = "Device enrollment and key escrow gateway")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "gatehouse")]
    pub mongodb_db: String,

    /// Enable development mode (in-memory storage, no MongoDB)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Upper bound for a single protocol operation in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "65536")]
    pub max_body_bytes: usize,

    /// Check-in policy advertised to devices
    #[command(flatten)]
    pub policy: PolicyArgs,
}

/// Advisory policy handed to devices at registration and key submission
#[derive(Parser, Debug, Clone)]
pub struct PolicyArgs {
    /// Heartbeat interval devices should use, in seconds
    #[arg(long, env = "HEARTBEAT_INTERVAL_SECS", default_value = "300")]
    pub heartbeat_interval_secs: u64,

    /// First retry delay after a failed call, in seconds
    #[arg(long, env = "RETRY_INITIAL_DELAY_SECS", default_value = "10")]
    pub retry_initial_delay_secs: u64,

    /// Retry delay ceiling, in seconds
    #[arg(long, env = "RETRY_MAX_DELAY_SECS", default_value = "300")]
    pub retry_max_delay_secs: u64,

    /// Multiplier applied to the retry delay after each failure
    #[arg(long, env = "RETRY_BACKOFF_FACTOR", default_value = "2")]
    pub retry_backoff_factor: u32,

    /// Retries before a device gives up until the next interval
    #[arg(long, env = "RETRY_MAX_RETRIES", default_value = "5")]
    pub retry_max_retries: u32,

    /// Next expected check-in after registration, in seconds
    #[arg(long, env = "REGISTRATION_CHECKIN_SECS", default_value = "300")]
    pub registration_checkin_secs: u64,

    /// Next expected check-in after a key submission, in seconds
    #[arg(long, env = "KEY_SUBMISSION_CHECKIN_SECS", default_value = "3600")]
    pub key_submission_checkin_secs: u64,
}

impl Args {
    /// Per-operation timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Build the protocol configuration threaded into the handlers
    pub fn protocol_config(&self) -> ProtocolConfig {
        let policy = &self.policy;
        ProtocolConfig {
            operation_timeout: self.request_timeout(),
            checkin: CheckinPolicy {
                heartbeat_interval: policy.heartbeat_interval_secs,
                retry_policy: RetryPolicy {
                    initial_delay: policy.retry_initial_delay_secs,
                    max_delay: policy.retry_max_delay_secs,
                    backoff_factor: policy.retry_backoff_factor,
                    max_retries: policy.retry_max_retries,
                },
            },
            registration_checkin: Duration::from_secs(policy.registration_checkin_secs),
            key_submission_checkin: Duration::from_secs(policy.key_submission_checkin_secs),
        }
    }

    /// Name of the storage backend selected by the configuration
    pub fn storage_backend(&self) -> &'static str {
        if self.dev_mode {
            "memory"
        } else {
            "mongodb"
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be greater than zero".to_string());
        }

        if self.policy.retry_backoff_factor == 0 {
            return Err("RETRY_BACKOFF_FACTOR must be at least 1".to_string());
        }

        if self.policy.retry_initial_delay_secs > self.policy.retry_max_delay_secs {
            return Err(
                "RETRY_INITIAL_DELAY_SECS must be less than or equal to RETRY_MAX_DELAY_SECS"
                    .to_string(),
            );
        }

        if self.mongodb_db.is_empty() {
            return Err("MONGODB_DB must not be empty".to_string());
        }

        Ok(())
    }
}
