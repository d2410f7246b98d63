//! Authentication module
//!
//! Bearer-token authentication for the direct upload API. The raw storage PUT
//! is never authenticated here; it is authorized by the presigned URL alone.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

pub mod jwt;

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Authenticator configuration error: {0}")]
    Configuration(String),
}

/// Authentication result containing claims
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub subject: String,
    pub claims: HashMap<String, serde_json::Value>,
}

/// Authenticator trait
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate a request
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthResult, AuthError>;
}

/// Authentication request context
#[derive(Debug)]
pub struct AuthRequest {
    /// Header names are lower-cased
    pub headers: HashMap<String, String>,
    pub query: Option<String>,
    pub method: String,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_result() {
        let result = AuthResult {
            subject: "planner-42".into(),
            claims: HashMap::new(),
        };
        assert_eq!(result.subject, "planner-42");
    }
}
