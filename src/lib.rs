//! Gatehouse - device enrollment and key escrow gateway
//!
//! Devices enroll over a small JSON/HTTP protocol:
//!
//! - **Register**: upsert an identity snapshot and receive the check-in policy
//! - **Provision keys**: receive a fresh RSA public key; the private half is
//!   retained on the device record
//! - **Heartbeat**: report liveness, geo and memory figures
//! - **Submit wrapped key**: return a symmetric key wrapped under the
//!   provisioned public key, appended to an authoritative ledger
//!
//! Records live in MongoDB, or in process memory when running in dev mode.

pub mod config;
pub mod db;
pub mod keys;
pub mod ledger;
pub mod protocol;
pub mod registry;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use protocol::{ProtocolConfig, ProtocolHandlers};
pub use server::{run, AppState};
pub use types::{GatehouseError, Result};
