//! JSON response construction.
//!
//! All bodies are JSON. Errors share one shape:
//!
//! ```text
//! {"error": "...", "code": "...", "stage": "...", "details": "...", "request_id": "..."}
//! ```
//!
//! `stage` and `details` are `null` when they do not apply, e.g. for routing errors.

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use ondc_edge_core::error::IngestError;
use serde::Serialize;
use tracing::error;

/// Body of every response: a small buffered JSON document, or nothing.
pub type EdgeResponseBody = Full<Bytes>;

/// Header carrying the request id on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Error body returned to callers.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: &'a str,
    stage: Option<&'a str>,
    details: Option<&'a str>,
    request_id: &'a str,
}

/// Build a response with `status` and `body` serialized as JSON.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> http::Response<EdgeResponseBody> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = http::Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(err) => {
            error!(error = %err, "failed to serialize response body");
            let mut response = http::Response::new(Full::default());
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

/// `202 Accepted` for a payload that was stored and announced.
#[must_use]
pub fn accepted_response() -> http::Response<EdgeResponseBody> {
    json_response(
        StatusCode::ACCEPTED,
        &serde_json::json!({ "status": "accepted" }),
    )
}

/// `200 OK` health probe answer.
#[must_use]
pub fn health_response(service: &str) -> http::Response<EdgeResponseBody> {
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "status": "ok", "service": service }),
    )
}

/// Convert a pipeline failure into its HTTP response.
#[must_use]
pub fn error_to_response(err: &IngestError, request_id: &str) -> http::Response<EdgeResponseBody> {
    json_response(
        err.kind.status_code(),
        &ErrorBody {
            error: &err.message,
            code: err.kind.code(),
            stage: Some(err.stage.as_str()),
            details: err.details.as_deref(),
            request_id,
        },
    )
}

/// Error response for failures outside the pipeline (routing, body limits).
#[must_use]
pub fn http_error_response(
    status: StatusCode,
    code: &str,
    message: &str,
    request_id: &str,
) -> http::Response<EdgeResponseBody> {
    json_response(
        status,
        &ErrorBody {
            error: message,
            code,
            stage: None,
            details: None,
            request_id,
        },
    )
}

/// Produce a CORS preflight response.
#[must_use]
pub fn cors_preflight_response() -> http::Response<EdgeResponseBody> {
    let mut response = http::Response::new(Full::default());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization, X-Request-ID"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    response
}

/// Add the headers every response carries.
#[must_use]
pub fn add_common_headers(
    mut response: http::Response<EdgeResponseBody>,
    request_id: &str,
) -> http::Response<EdgeResponseBody> {
    let headers = response.headers_mut();

    if let Ok(hv) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, hv);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("X-Request-ID"),
    );

    response
}
