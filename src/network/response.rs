//! Response builders

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::HeaderValue;
use hyper::{Response, StatusCode};
use tracing::warn;

use crate::error::{RelayError, Result};

pub type HttpResponse = Response<Full<Bytes>>;

/// Response with `status` and `body`
pub fn build(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// 200 with `body`
pub fn ok(body: impl Into<Bytes>) -> HttpResponse {
    build(StatusCode::OK, body)
}

pub fn not_found() -> HttpResponse {
    build(StatusCode::NOT_FOUND, "not found\n")
}

pub fn method_not_allowed() -> HttpResponse {
    build(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n")
}

pub fn bad_request(message: &str) -> HttpResponse {
    build(StatusCode::BAD_REQUEST, format!("{}\n", message))
}

/// Map an error to its status code
pub fn from_error(err: &RelayError) -> HttpResponse {
    let status = match err {
        RelayError::Protocol(_) | RelayError::PositionAhead { .. } => StatusCode::BAD_REQUEST,
        RelayError::BinlogDisabled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %err, status = status.as_u16(), "request failed");
    }
    build(status, format!("{}\n", err))
}

/// Add a header, failing when `value` is not a legal header value
pub fn with_header(mut response: HttpResponse, name: &'static str, value: &str) -> Result<HttpResponse> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| RelayError::Protocol(format!("'{}' is not a valid {} header", value, name)))?;
    response.headers_mut().insert(name, value);
    Ok(response)
}
