//! Configuration module for Direct Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and comprehensive validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Upper bound for `upload.retention_seconds`
pub const MAX_RETENTION_SECONDS: u64 = 30 * 24 * 3600;

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server.base_path.is_empty()
            && (!self.server.base_path.starts_with('/') || self.server.base_path.ends_with('/'))
        {
            return Err(ConfigError::ValidationError(format!(
                "server.base_path '{}' must start with '/' and must not end with '/'",
                self.server.base_path
            )));
        }

        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.bucket cannot be empty".into(),
            ));
        }

        if self.storage.region.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "storage.region cannot be empty".into(),
            ));
        }

        if let Some(ref endpoint) = self.storage.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(
                    "Invalid storage endpoint: must start with http:// or https://".into(),
                ));
            }
        }

        if let Some(ref base) = self.storage.public_base_url {
            if !is_valid_http_url(base) {
                return Err(ConfigError::ValidationError(
                    "Invalid storage public_base_url: must start with http:// or https://".into(),
                ));
            }
        }

        reject_placeholder("storage.access_key", self.storage.access_key.as_deref())?;
        reject_placeholder("storage.secret_key", self.storage.secret_key.as_deref())?;
        reject_placeholder("storage.session_token", self.storage.session_token.as_deref())?;

        if self.auth.enabled {
            let jwt = self.auth.jwt.as_ref().ok_or_else(|| {
                ConfigError::ValidationError("auth.enabled requires an auth.jwt section".into())
            })?;

            if jwt.secret.as_deref().map_or(true, |s| s.trim().is_empty()) {
                return Err(ConfigError::ValidationError(
                    "auth.jwt.secret must be set when auth is enabled".into(),
                ));
            }

            reject_placeholder("auth.jwt.secret", jwt.secret.as_deref())?;

            match jwt.algorithm.to_uppercase().as_str() {
                "HS256" | "RS256" | "ES256" => {}
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "Invalid JWT algorithm '{}': must be 'HS256', 'RS256', or 'ES256'",
                        other
                    )))
                }
            }
        }

        self.upload.validate()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    /// Prefix mounted in front of the `/direct-upload` routes, e.g. `/api`.
    #[serde(default)]
    pub base_path: String,
}

/// Object storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    /// Address objects as `{endpoint}/{bucket}/{key}` (MinIO) instead of
    /// `{bucket}.{endpoint}/{key}`.
    #[serde(default)]
    pub force_path_style: bool,
    /// Base URL used for the public object URL returned on confirmation
    /// (CDN or custom domain). Falls back to the storage endpoint.
    #[serde(default)]
    pub public_base_url: Option<String>,
    #[serde(default = "default_storage_timeout")]
    pub timeout_seconds: u64,
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_storage_timeout() -> u64 {
    30
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub jwt: Option<JwtConfig>,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HMAC secret (HS256) or PEM public key (RS256 / ES256)
    pub secret: Option<String>,
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
}

fn default_jwt_algorithm() -> String {
    "HS256".to_string()
}

/// Direct upload policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// First segment of every storage key
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_ttl")]
    pub default_ttl_seconds: u64,
    #[serde(default = "default_min_ttl")]
    pub min_ttl_seconds: u64,
    #[serde(default = "default_max_ttl")]
    pub max_ttl_seconds: u64,
    /// Global size cap applied on top of the per-type caps
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_max_file_name_length")]
    pub max_file_name_length: usize,
    /// Allowed difference between declared and confirmed size. 0 means exact match.
    #[serde(default)]
    pub size_tolerance_bytes: u64,
    /// HEAD the object in storage before confirming
    #[serde(default)]
    pub verify_object: bool,
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// How long confirmed/expired sessions stay queryable after their deadline
    #[serde(default = "default_retention")]
    pub retention_seconds: u64,
    #[serde(default)]
    pub file_types: FileTypesConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            default_ttl_seconds: default_ttl(),
            min_ttl_seconds: default_min_ttl(),
            max_ttl_seconds: default_max_ttl(),
            max_file_size: default_max_file_size(),
            max_file_name_length: default_max_file_name_length(),
            size_tolerance_bytes: 0,
            verify_object: false,
            operation_timeout_seconds: default_operation_timeout(),
            sweep_interval_seconds: default_sweep_interval(),
            retention_seconds: default_retention(),
            file_types: FileTypesConfig::default(),
        }
    }
}

impl UploadConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn retention(&self) -> chrono::Duration {
        let seconds = self.retention_seconds.min(MAX_RETENTION_SECONDS);
        chrono::Duration::seconds(seconds as i64)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() || self.namespace.contains('/') {
            return Err(ConfigError::ValidationError(
                "upload.namespace must be a single non-empty path segment".into(),
            ));
        }

        if self.min_ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "upload.min_ttl_seconds must be greater than 0".into(),
            ));
        }

        if self.min_ttl_seconds > self.max_ttl_seconds {
            return Err(ConfigError::ValidationError(format!(
                "upload.min_ttl_seconds ({}) must not exceed upload.max_ttl_seconds ({})",
                self.min_ttl_seconds, self.max_ttl_seconds
            )));
        }

        if self.default_ttl_seconds < self.min_ttl_seconds
            || self.default_ttl_seconds > self.max_ttl_seconds
        {
            return Err(ConfigError::ValidationError(format!(
                "upload.default_ttl_seconds ({}) must be within [{}, {}]",
                self.default_ttl_seconds, self.min_ttl_seconds, self.max_ttl_seconds
            )));
        }

        // SigV4 presigned URLs cannot outlive seven days
        if self.max_ttl_seconds > 604_800 {
            return Err(ConfigError::ValidationError(
                "upload.max_ttl_seconds cannot exceed 604800 (7 days)".into(),
            ));
        }

        if self.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_file_size must be greater than 0".into(),
            ));
        }

        if self.max_file_name_length == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_file_name_length must be greater than 0".into(),
            ));
        }

        if self.operation_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "upload.operation_timeout_seconds must be greater than 0".into(),
            ));
        }

        if self.retention_seconds > MAX_RETENTION_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "upload.retention_seconds cannot exceed {} (30 days)",
                MAX_RETENTION_SECONDS
            )));
        }

        if self.sweep_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "upload.sweep_interval_seconds must be greater than 0".into(),
            ));
        }

        for (name, policy) in [
            ("image", &self.file_types.image),
            ("video", &self.file_types.video),
            ("document", &self.file_types.document),
        ] {
            if policy.max_size == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "upload.file_types.{}.max_size must be greater than 0",
                    name
                )));
            }
            if policy.allowed_types.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "upload.file_types.{}.allowed_types cannot be empty",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Credentials must not fall back to a literal `${VAR}` when the variable is unset
fn reject_placeholder(field: &str, value: Option<&str>) -> Result<(), ConfigError> {
    match value {
        Some(v) if loader::ConfigLoader::has_unexpanded_var(v) => Err(ConfigError::ValidationError(
            format!("{} references an unset environment variable", field),
        )),
        _ => Ok(()),
    }
}

fn default_namespace() -> String {
    "uploads".to_string()
}

fn default_ttl() -> u64 {
    3600
}

fn default_min_ttl() -> u64 {
    60
}

fn default_max_ttl() -> u64 {
    7200
}

fn default_max_file_size() -> u64 {
    524288000 // 500MB
}

fn default_max_file_name_length() -> usize {
    255
}

fn default_operation_timeout() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_retention() -> u64 {
    3600
}

/// Per file type upload policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTypesConfig {
    #[serde(default = "default_image_policy")]
    pub image: FileTypePolicy,
    #[serde(default = "default_video_policy")]
    pub video: FileTypePolicy,
    #[serde(default = "default_document_policy")]
    pub document: FileTypePolicy,
}

impl Default for FileTypesConfig {
    fn default() -> Self {
        Self {
            image: default_image_policy(),
            video: default_video_policy(),
            document: default_document_policy(),
        }
    }
}

/// Size cap and allowed MIME types for one file type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTypePolicy {
    pub max_size: u64,
    pub allowed_types: Vec<String>,
}

fn policy(max_size: u64, types: &[&str]) -> FileTypePolicy {
    FileTypePolicy {
        max_size,
        allowed_types: types.iter().map(|t| t.to_string()).collect(),
    }
}

fn default_image_policy() -> FileTypePolicy {
    policy(
        52428800, // 50MB
        &[
            "image/jpeg",
            "image/jpg",
            "image/png",
            "image/gif",
            "image/webp",
            "image/bmp",
            "image/tiff",
        ],
    )
}

fn default_video_policy() -> FileTypePolicy {
    policy(
        524288000, // 500MB
        &[
            "video/mp4",
            "video/avi",
            "video/mov",
            "video/wmv",
            "video/quicktime",
            "video/flv",
            "video/webm",
            "video/mkv",
        ],
    )
}

fn default_document_policy() -> FileTypePolicy {
    policy(
        20971520, // 20MB
        &[
            "application/pdf",
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.ms-excel",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "application/vnd.ms-powerpoint",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "text/plain",
            "application/zip",
        ],
    )
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}
