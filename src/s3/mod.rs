//! S3 Client module
//!
//! Signs direct-upload URLs for an S3-compatible store (AWS S3, MinIO, ...)
//! and optionally inspects uploaded objects.
//!
//! # Example
//!
//! ```no_run
//! use direct_uploadr::s3::{ObjectStorage, S3Client, S3ClientConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = S3ClientConfig {
//!     bucket: "wedding-media".to_string(),
//!     region: "us-east-1".to_string(),
//!     endpoint: Some("http://localhost:9000".to_string()),
//!     force_path_style: true,
//!     public_base_url: None,
//!     timeout: Duration::from_secs(30),
//! };
//!
//! let client = S3Client::with_credentials(
//!     config,
//!     direct_uploadr::s3::Credentials::new("minioadmin", "minioadmin"),
//! )?;
//! let url = client
//!     .presign_put("uploads/images/a.jpg", "image/jpeg", Duration::from_secs(3600))
//!     .await?;
//! println!("PUT the file to {}", url);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use std::time::Duration;
use thiserror::Error;

pub mod credentials;
pub mod sigv4;

pub use credentials::{Credentials, CredentialsError, CredentialsProvider};

/// Lifetime of the presigned HEAD used to inspect an uploaded object
const HEAD_URL_TTL_SECS: u64 = 60;

/// S3 client errors
#[derive(Error, Debug)]
pub enum S3ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    RequestError(String),

    #[error("Response error: {0}")]
    ResponseError(String),

    #[error("Signing error: {0}")]
    SigningError(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for S3ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            S3ClientError::Timeout(e.to_string())
        } else {
            S3ClientError::RequestError(e.to_string())
        }
    }
}

/// Metadata reported by a HEAD on an object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectMetadata {
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// Object storage seam used by the upload service
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// URL authorizing exactly one PUT of `key` with `content_type` within `expires_in`
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, S3ClientError>;

    /// `Ok(None)` when the object does not exist
    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>, S3ClientError>;

    /// Public URL of an object once uploaded
    fn public_url(&self, key: &str) -> String;
}

/// S3 Client configuration
#[derive(Debug, Clone)]
pub struct S3ClientConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub force_path_style: bool,
    pub public_base_url: Option<String>,
    pub timeout: Duration,
}

impl From<&crate::config::StorageConfig> for S3ClientConfig {
    fn from(config: &crate::config::StorageConfig) -> Self {
        Self {
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
            force_path_style: config.force_path_style,
            public_base_url: config.public_base_url.clone(),
            timeout: config.timeout(),
        }
    }
}

/// Where requests for a key are sent
struct ObjectTarget {
    base_url: String,
    host: String,
    canonical_uri: String,
}

/// S3 Client
pub struct S3Client {
    config: S3ClientConfig,
    credentials: Option<Credentials>,
    scheme: String,
    /// `host[:port]` of the endpoint, without the bucket
    authority: String,
    http_client: reqwest::Client,
}

impl S3Client {
    /// Create a client, resolving credentials from config then environment.
    ///
    /// A client without credentials is still created; every signing attempt
    /// then fails with [`S3ClientError::SigningError`].
    pub fn from_storage_config(
        config: &crate::config::StorageConfig,
    ) -> Result<Self, S3ClientError> {
        let credentials = match CredentialsProvider::resolve(config) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                tracing::warn!(error = %e, "No storage credentials available, signing will fail");
                None
            }
        };
        Self::build(S3ClientConfig::from(config), credentials)
    }

    /// Create a client with explicit credentials
    pub fn with_credentials(
        config: S3ClientConfig,
        credentials: Credentials,
    ) -> Result<Self, S3ClientError> {
        Self::build(config, Some(credentials))
    }

    /// Create a client that cannot sign
    pub fn anonymous(config: S3ClientConfig) -> Result<Self, S3ClientError> {
        Self::build(config, None)
    }

    fn build(
        config: S3ClientConfig,
        credentials: Option<Credentials>,
    ) -> Result<Self, S3ClientError> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", config.region));
        let url = Url::parse(&endpoint)
            .map_err(|e| S3ClientError::ConfigError(format!("Invalid endpoint {}: {}", endpoint, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| S3ClientError::ConfigError(format!("Endpoint {} has no host", endpoint)))?;
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| S3ClientError::ConfigError(e.to_string()))?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            authority,
            config,
            credentials,
            http_client,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    pub fn region(&self) -> &str {
        &self.config.region
    }

    /// Endpoint URL without the bucket
    pub fn endpoint(&self) -> String {
        format!("{}://{}", self.scheme, self.authority)
    }

    fn target(&self, key: &str) -> ObjectTarget {
        let encoded_key = sigv4::encode_path(key);
        if self.config.force_path_style {
            ObjectTarget {
                base_url: self.endpoint(),
                host: self.authority.clone(),
                canonical_uri: format!("/{}/{}", self.config.bucket, encoded_key),
            }
        } else {
            let host = format!("{}.{}", self.config.bucket, self.authority);
            ObjectTarget {
                base_url: format!("{}://{}", self.scheme, host),
                host,
                canonical_uri: format!("/{}", encoded_key),
            }
        }
    }

    fn presign(
        &self,
        method: &str,
        key: &str,
        headers: &[(&str, &str)],
        expires_in: u64,
    ) -> Result<String, S3ClientError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| S3ClientError::SigningError("no storage credentials configured".into()))?;

        if key.is_empty() {
            return Err(S3ClientError::SigningError("object key cannot be empty".into()));
        }

        let target = self.target(key);
        Ok(sigv4::presign(
            credentials,
            &sigv4::PresignRequest {
                method,
                base_url: &target.base_url,
                host: &target.host,
                canonical_uri: &target.canonical_uri,
                headers,
                region: &self.config.region,
                expires_in,
                now: Utc::now(),
            },
        ))
    }
}

#[async_trait]
impl ObjectStorage for S3Client {
    #[tracing::instrument(
        name = "s3.presign_put",
        skip(self, expires_in),
        fields(
            s3.bucket = %self.config.bucket,
            s3.key = %key,
            http.method = "PUT",
            expires_in = expires_in.as_secs()
        ),
        err
    )]
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<String, S3ClientError> {
        self.presign(
            "PUT",
            key,
            &[("content-type", content_type)],
            expires_in.as_secs(),
        )
    }

    #[tracing::instrument(
        name = "s3.head_object",
        skip(self),
        fields(
            s3.bucket = %self.config.bucket,
            s3.key = %key,
            http.method = "HEAD",
            http.status_code = tracing::field::Empty
        ),
        err
    )]
    async fn head_object(&self, key: &str) -> Result<Option<ObjectMetadata>, S3ClientError> {
        let url = self.presign("HEAD", key, &[], HEAD_URL_TTL_SECS)?;
        let response = self.http_client.head(&url).send().await?;

        let status = response.status();
        tracing::Span::current().record("http.status_code", status.as_u16());

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(S3ClientError::ResponseError(format!(
                "HEAD {} returned {}",
                key, status
            )));
        }

        // HEAD bodies are empty, so read the header rather than the body size hint
        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };

        Ok(Some(ObjectMetadata {
            content_length: header(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.parse().ok()),
            content_type: header(reqwest::header::CONTENT_TYPE),
            etag: header(reqwest::header::ETAG),
        }))
    }

    fn public_url(&self, key: &str) -> String {
        match self.config.public_base_url {
            Some(ref base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                sigv4::encode_path(key)
            ),
            None => {
                let target = self.target(key);
                format!("{}{}", target.base_url, target.canonical_uri)
            }
        }
    }
}
