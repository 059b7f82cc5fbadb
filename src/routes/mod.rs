//! HTTP routes for Gatehouse

pub mod devices;
pub mod health;

pub use devices::{
    handle_heartbeat, handle_provision_keys, handle_register, handle_submit_wrapped_key,
};
pub use health::health_check;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CACHE_CONTROL, CONTENT_TYPE,
};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::types::GatehouseError;

const JSON: &str = "application/json";

/// Response with the headers every Gatehouse reply carries
pub fn with_body(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Serialize `value` as the JSON body
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => with_body(status, JSON, body),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            error_response(&GatehouseError::Internal(e.to_string()))
        }
    }
}

/// `{"error": marker}` with the error's status; never the error text
pub fn error_response(err: &GatehouseError) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": err.marker() });
    with_body(err.status_code(), JSON, body.to_string())
}

pub fn not_found_response() -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": "not_found" });
    with_body(StatusCode::NOT_FOUND, JSON, body.to_string())
}

/// Known route, wrong method
pub fn method_not_allowed_response(allow: &'static str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({ "error": "method_not_allowed" });
    let mut response = with_body(StatusCode::METHOD_NOT_ALLOWED, JSON, body.to_string());
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    response
}

/// CORS preflight response
pub fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = with_body(StatusCode::OK, "text/plain", Bytes::new());
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}
