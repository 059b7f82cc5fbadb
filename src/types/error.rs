//! Error types for Gatehouse
//!
//! Every protocol failure collapses into one of three outcomes on the wire:
//! client error, unregistered device, or internal error. The variant keeps the
//! detail for server-side logs; callers only ever see [`GatehouseError::marker`].

use hyper::StatusCode;
use std::time::Duration;

/// Marker returned for malformed or unidentified requests
pub const MARKER_INVALID_REQUEST: &str = "invalid_request";

/// Marker returned when a device has never registered
pub const MARKER_NOT_REGISTERED: &str = "device_not_registered";

/// Marker returned for every server-side failure
pub const MARKER_INTERNAL: &str = "internal_error";

/// Main error type for Gatehouse operations
#[derive(Debug, thiserror::Error)]
pub enum GatehouseError {
    #[error("Missing device identity header")]
    MissingIdentity,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Key generation error: {0}")]
    KeyGeneration(String),

    #[error("Key encoding error: {0}")]
    Encoding(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatehouseError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingIdentity | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_)
            | Self::Timeout(_)
            | Self::KeyGeneration(_)
            | Self::Encoding(_)
            | Self::Internal(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Opaque marker safe to return to the caller
    pub fn marker(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => MARKER_INVALID_REQUEST,
            StatusCode::NOT_FOUND => MARKER_NOT_REGISTERED,
            _ => MARKER_INTERNAL,
        }
    }

    /// Whether the failure was caused by the caller
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl From<std::io::Error> for GatehouseError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for GatehouseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("Invalid JSON body: {}", err))
    }
}

impl From<bson::ser::Error> for GatehouseError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Storage(format!("BSON serialization failed: {}", err))
    }
}

/// Result type alias for Gatehouse operations
pub type Result<T> = std::result::Result<T, GatehouseError>;
