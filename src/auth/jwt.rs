//! JWT Authentication
//!
//! Supports HS256, RS256 and ES256 algorithms.

use super::{AuthError, AuthRequest, AuthResult, Authenticator};
use crate::config::JwtConfig;
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub iat: Option<usize>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
}

/// JWT Authenticator
///
/// # Example
///
/// ```
/// use direct_uploadr::auth::jwt::JwtAuthenticator;
///
/// let auth = JwtAuthenticator::new_hs256("my-secret")
///     .with_issuer("https://auth.example.com")
///     .with_audience("direct-upload");
/// ```
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    /// Create a new JWT authenticator with a secret key (HS256)
    pub fn new_hs256(secret: &str) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());
        Self {
            decoding_key,
            validation: Self::validation_for(Algorithm::HS256),
        }
    }

    /// Create a new JWT authenticator with an RSA public key (RS256)
    pub fn new_rs256(public_key_pem: &str) -> Result<Self, AuthError> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| AuthError::Configuration(e.to_string()))?;
        Ok(Self {
            decoding_key,
            validation: Self::validation_for(Algorithm::RS256),
        })
    }

    /// Create a new JWT authenticator with an EC public key (ES256)
    pub fn new_es256(public_key_pem: &str) -> Result<Self, AuthError> {
        let decoding_key = DecodingKey::from_ec_pem(public_key_pem.as_bytes())
            .map_err(|e| AuthError::Configuration(e.to_string()))?;
        Ok(Self {
            decoding_key,
            validation: Self::validation_for(Algorithm::ES256),
        })
    }

    /// Build an authenticator from the `auth.jwt` configuration section
    pub fn from_config(config: &JwtConfig) -> Result<Self, AuthError> {
        let secret = config
            .secret
            .as_deref()
            .ok_or_else(|| AuthError::Configuration("JWT secret is not configured".into()))?;

        let mut authenticator = match config.algorithm.to_uppercase().as_str() {
            "HS256" => Self::new_hs256(secret),
            "RS256" => Self::new_rs256(secret)?,
            "ES256" => Self::new_es256(secret)?,
            alg => {
                return Err(AuthError::Configuration(format!(
                    "Unsupported JWT algorithm: {}",
                    alg
                )))
            }
        };

        if let Some(ref issuer) = config.issuer {
            authenticator = authenticator.with_issuer(issuer);
        }
        if let Some(ref audience) = config.audience {
            authenticator = authenticator.with_audience(audience);
        }

        Ok(authenticator)
    }

    fn validation_for(algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.validate_aud = false; // Only validate aud when explicitly set
        validation
    }

    /// Set the required issuer (`iss` claim)
    #[must_use]
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    /// Set the required audience (`aud` claim)
    #[must_use]
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self
    }

    /// Extract token from the Authorization header or the `token` query parameter
    fn extract_token(&self, request: &AuthRequest) -> Option<String> {
        if let Some(auth) = request.headers.get("authorization") {
            if let Some(token) = auth.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }

        if let Some(query) = &request.query {
            for pair in query.split('&') {
                if let Some(token) = pair.strip_prefix("token=") {
                    return Some(token.to_string());
                }
            }
        }

        None
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<AuthResult, AuthError> {
        let token = self.extract_token(request).ok_or(AuthError::MissingAuth)?;

        let token_data =
            decode::<Claims>(&token, &self.decoding_key, &self.validation).map_err(|e| match e
                .kind()
            {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken(e.to_string()),
            })?;

        if token_data.claims.sub.trim().is_empty() {
            return Err(AuthError::InvalidToken("empty subject".into()));
        }

        let mut claims_map = HashMap::new();
        if let Some(iss) = &token_data.claims.iss {
            claims_map.insert("iss".into(), serde_json::Value::String(iss.clone()));
        }
        if let Some(aud) = &token_data.claims.aud {
            claims_map.insert("aud".into(), serde_json::Value::String(aud.clone()));
        }

        tracing::debug!(subject = %token_data.claims.sub, "JWT authentication successful");

        Ok(AuthResult {
            subject: token_data.claims.sub,
            claims: claims_map,
        })
    }
}
