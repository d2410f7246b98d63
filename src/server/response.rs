//! JSON response envelope
//!
//! Every API response is `{success, data?, message?, error?}` where `error`
//! carries the error class name.

use crate::upload::UploadError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

pub type ApiResponse = Response<Full<Bytes>>;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// HTTP status for an upload error
pub fn status_for(error: &UploadError) -> StatusCode {
    match error {
        UploadError::Validation(_) => StatusCode::BAD_REQUEST,
        UploadError::Forbidden(_) => StatusCode::FORBIDDEN,
        UploadError::NotFound(_) => StatusCode::NOT_FOUND,
        UploadError::Conflict(_) => StatusCode::CONFLICT,
        UploadError::Expired(_) => StatusCode::GONE,
        UploadError::Dependency(_) => StatusCode::BAD_GATEWAY,
        UploadError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
    }
}

fn json<T: Serialize>(status: StatusCode, body: &Envelope<T>) -> ApiResponse {
    let (status, payload) = match serde_json::to_vec(body) {
        Ok(payload) => (status, payload),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"success":false,"error":"InternalError"}"#.to_vec(),
            )
        }
    };

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(payload)))
        .expect("Failed to build JSON response")
}

/// 200 with `data`
pub fn success<T: Serialize>(data: T, message: &str) -> ApiResponse {
    json(
        StatusCode::OK,
        &Envelope {
            success: true,
            data: Some(data),
            message: Some(message.to_string()),
            error: None,
        },
    )
}

/// Failure envelope with an explicit status and class
pub fn failure(status: StatusCode, class: &'static str, message: impl Into<String>) -> ApiResponse {
    json::<()>(
        status,
        &Envelope {
            success: false,
            data: None,
            message: Some(message.into()),
            error: Some(class),
        },
    )
}

pub fn upload_error(error: &UploadError) -> ApiResponse {
    failure(status_for(error), error.class(), error.to_string())
}

pub fn unauthorized(message: impl Into<String>) -> ApiResponse {
    let mut response = failure(StatusCode::UNAUTHORIZED, "AuthenticationError", message);
    response.headers_mut().insert(
        hyper::header::WWW_AUTHENTICATE,
        hyper::header::HeaderValue::from_static("Bearer"),
    );
    response
}

pub fn not_found() -> ApiResponse {
    failure(StatusCode::NOT_FOUND, "NotFoundError", "Route not found")
}

pub fn method_not_allowed(allowed: &'static str) -> ApiResponse {
    let mut response = failure(
        StatusCode::METHOD_NOT_ALLOWED,
        "MethodNotAllowedError",
        format!("Method not allowed, use {}", allowed),
    );
    response.headers_mut().insert(
        hyper::header::ALLOW,
        hyper::header::HeaderValue::from_static(allowed),
    );
    response
}

pub fn health() -> ApiResponse {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from_static(br#"{"status":"ok"}"#)))
        .expect("Failed to build health check response")
}
