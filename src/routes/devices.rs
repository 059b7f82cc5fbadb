//! Device protocol routes
//!
//! Thin translation between HTTP and [`ProtocolHandlers`]: identity comes from
//! the headers, the collected body is handed over untouched, and every failure
//! is logged in full before being reduced to its marker.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{HeaderMap, Response, StatusCode};
use tracing::{error, warn};

use super::{error_response, json_response, with_body};
use crate::keys::PEM_CONTENT_TYPE;
use crate::protocol::validator::{CLIENT_VERSION_HEADER, REQUEST_TYPE_HEADER};
use crate::protocol::{
    extract_device_id, optional_header, DeviceId, ProtocolHandlers, SubmissionMeta,
};
use crate::types::GatehouseError;

fn failure(
    operation: &'static str,
    device_id: Option<&DeviceId>,
    err: GatehouseError,
) -> Response<Full<Bytes>> {
    let device_id = device_id.map(DeviceId::as_str).unwrap_or("-");
    if err.is_client_error() {
        warn!(operation, device_id, error = %err, "Rejected device request");
    } else {
        error!(operation, device_id, error = %err, "Device request failed");
    }
    error_response(&err)
}

/// POST /api/v1/devices/register
pub async fn handle_register(
    protocol: &ProtocolHandlers,
    headers: &HeaderMap,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let device_id = match extract_device_id(headers) {
        Ok(id) => id,
        Err(e) => return failure("register", None, e),
    };

    match protocol.register(&device_id, &body).await {
        Ok(response) => json_response(StatusCode::OK, &response),
        Err(e) => failure("register", Some(&device_id), e),
    }
}

/// POST /api/v1/devices/keys
pub async fn handle_provision_keys(
    protocol: &ProtocolHandlers,
    headers: &HeaderMap,
) -> Response<Full<Bytes>> {
    let device_id = match extract_device_id(headers) {
        Ok(id) => id,
        Err(e) => return failure("provision_keys", None, e),
    };

    match protocol.provision_keys(&device_id).await {
        Ok(public_pem) => with_body(StatusCode::OK, PEM_CONTENT_TYPE, public_pem),
        Err(e) => failure("provision_keys", Some(&device_id), e),
    }
}

/// POST /api/v1/devices/heartbeat
pub async fn handle_heartbeat(
    protocol: &ProtocolHandlers,
    headers: &HeaderMap,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let device_id = match extract_device_id(headers) {
        Ok(id) => id,
        Err(e) => return failure("heartbeat", None, e),
    };

    match protocol.heartbeat(&device_id, &body).await {
        Ok(ack) => json_response(StatusCode::OK, &ack),
        Err(e) => failure("heartbeat", Some(&device_id), e),
    }
}

/// POST /api/v1/devices/wrapped-key
pub async fn handle_submit_wrapped_key(
    protocol: &ProtocolHandlers,
    headers: &HeaderMap,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let device_id = match extract_device_id(headers) {
        Ok(id) => id,
        Err(e) => return failure("submit_wrapped_key", None, e),
    };

    let meta = SubmissionMeta {
        client_version: optional_header(headers, CLIENT_VERSION_HEADER),
        request_type: optional_header(headers, REQUEST_TYPE_HEADER),
    };

    match protocol.submit_wrapped_key(&device_id, &body, meta).await {
        Ok(response) => json_response(StatusCode::OK, &response),
        Err(e) => failure("submit_wrapped_key", Some(&device_id), e),
    }
}
