//! Request routing and API handlers

use super::response::{self, ApiResponse};
use super::AppState;
use crate::auth::{AuthError, AuthRequest};
use crate::metrics;
use crate::upload::{ConfirmUploadRequest, PresignedUrlRequest, UploadError};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

/// Request bodies are small JSON documents
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Subject used when authentication is disabled
pub const ANONYMOUS_USER: &str = "anonymous";

const ROUTE_PREFIX: &str = "/direct-upload";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelUploadRequest {
    upload_session_id: String,
}

/// API routes below `{base_path}/direct-upload`
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Health,
    Presign,
    Confirm,
    Cancel,
    Progress(String),
}

impl Route {
    /// Resolve a request path, `None` when nothing matches
    pub fn resolve(base_path: &str, path: &str) -> Option<Route> {
        if path == "/health" {
            return Some(Route::Health);
        }

        let rest = path
            .strip_prefix(base_path)?
            .strip_prefix(ROUTE_PREFIX)?
            .trim_end_matches('/');

        match rest {
            "/presigned-url" => Some(Route::Presign),
            "/confirm" => Some(Route::Confirm),
            "/cancel" => Some(Route::Cancel),
            _ => {
                let id = rest.strip_prefix("/progress/")?;
                if id.is_empty() || id.contains('/') {
                    None
                } else {
                    Some(Route::Progress(id.to_string()))
                }
            }
        }
    }

    fn method(&self) -> Method {
        match self {
            Route::Health | Route::Progress(_) => Method::GET,
            Route::Presign | Route::Confirm | Route::Cancel => Method::POST,
        }
    }

    fn method_name(&self) -> &'static str {
        match self.method() {
            Method::GET => "GET",
            _ => "POST",
        }
    }
}

/// Entry point for every request on the API listener
pub async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<ApiResponse, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = route(req, &state).await;
    info!(
        http.method = %method,
        http.target = %path,
        http.status_code = response.status().as_u16(),
        "Handled request"
    );
    Ok(response)
}

async fn route(req: Request<Incoming>, state: &AppState) -> ApiResponse {
    let route = match Route::resolve(&state.base_path, req.uri().path()) {
        Some(route) => route,
        None => return response::not_found(),
    };

    if req.method() != route.method() {
        return response::method_not_allowed(route.method_name());
    }

    if route == Route::Health {
        return response::health();
    }

    let user = match authenticate(&req, state).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match route {
        Route::Presign => {
            let request: PresignedUrlRequest = match read_json(req).await {
                Ok(request) => request,
                Err(response) => return response,
            };
            match state.service.presign(&user, request).await {
                Ok(issued) => response::success(issued, "Presigned URL generated successfully"),
                Err(e) => response::upload_error(&e),
            }
        }
        Route::Confirm => {
            let request: ConfirmUploadRequest = match read_json(req).await {
                Ok(request) => request,
                Err(response) => return response,
            };
            match state.service.confirm(&user, request).await {
                Ok(confirmed) => response::success(confirmed, "Upload confirmed successfully"),
                Err(e) => response::upload_error(&e),
            }
        }
        Route::Cancel => {
            let request: CancelUploadRequest = match read_json(req).await {
                Ok(request) => request,
                Err(response) => return response,
            };
            match state.service.cancel(&user, &request.upload_session_id).await {
                Ok(cancelled) => response::success(cancelled, "Upload cancelled"),
                Err(e) => response::upload_error(&e),
            }
        }
        Route::Progress(id) => match state.service.progress(&user, &id).await {
            Ok(progress) => response::success(progress, "Upload session found"),
            Err(e) => response::upload_error(&e),
        },
        Route::Health => response::health(),
    }
}

/// Build AuthRequest from hyper Request headers
fn build_auth_request(req: &Request<Incoming>) -> AuthRequest {
    let mut headers = HashMap::new();
    for (name, value) in req.headers() {
        if let Ok(v) = value.to_str() {
            headers.insert(name.as_str().to_lowercase(), v.to_string());
        }
    }

    AuthRequest {
        headers,
        query: req.uri().query().map(|q| q.to_string()),
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
    }
}

/// Subject of the caller, or the 401 to send back
async fn authenticate(req: &Request<Incoming>, state: &AppState) -> Result<String, ApiResponse> {
    let authenticator = match state.authenticator {
        Some(ref authenticator) => authenticator,
        None => return Ok(ANONYMOUS_USER.to_string()),
    };

    match authenticator.authenticate(&build_auth_request(req)).await {
        Ok(result) => {
            metrics::record_auth_attempt("jwt", true);
            Ok(result.subject)
        }
        Err(e) => {
            metrics::record_auth_attempt("jwt", false);
            metrics::record_error("AuthenticationError");
            warn!(error = %e, path = %req.uri().path(), "Authentication failed");
            let message = match e {
                AuthError::MissingAuth => "Missing authentication".to_string(),
                AuthError::TokenExpired => "Token expired".to_string(),
                AuthError::InvalidSignature | AuthError::InvalidToken(_) => {
                    "Invalid token".to_string()
                }
                other => format!("Authentication failed: {}", other),
            };
            Err(response::unauthorized(message))
        }
    }
}

/// Collect a bounded body and decode it as JSON
async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, ApiResponse> {
    let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            return Err(response::failure(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PayloadTooLargeError",
                format!("Request body exceeds {} bytes", MAX_BODY_BYTES),
            ));
        }
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return Err(response::failure(
                StatusCode::BAD_REQUEST,
                "ValidationError",
                format!("Failed to read body: {}", e),
            ));
        }
    };

    serde_json::from_slice(&body).map_err(|e| {
        metrics::record_error("ValidationError");
        response::upload_error(&UploadError::Validation(format!(
            "Invalid request body: {}",
            e
        )))
    })
}
