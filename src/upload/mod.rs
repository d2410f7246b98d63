//! Upload module
//!
//! The direct upload handshake: a client reserves an upload slot and gets a
//! presigned URL, PUTs the bytes straight to object storage, then confirms.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod policy;
pub mod service;
pub mod session;
pub mod store;
pub mod sweeper;

pub use service::{
    CancelledUpload, ConfirmUploadRequest, ConfirmedUpload, DirectUploadService,
    PresignedUpload, PresignedUrlRequest, UploadProgress,
};
pub use policy::UploadPolicy;
pub use session::{SessionState, UploadSession};
pub use store::{InMemorySessionStore, SessionStore, SweepStats, Transition};
pub use sweeper::SessionSweeper;

/// Upload errors
///
/// Every variant maps to one error class reported to API callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),

    #[error("Upload session not found: {0}")]
    NotFound(String),

    #[error("Upload session already confirmed: {0}")]
    Conflict(String),

    #[error("Upload session expired: {0}")]
    Expired(String),

    #[error("Not permitted to access upload session: {0}")]
    Forbidden(String),

    #[error("Storage dependency failed: {0}")]
    Dependency(String),

    #[error("{operation} timed out after {}s", .timeout.as_secs())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl UploadError {
    /// Error class name surfaced in API responses
    pub fn class(&self) -> &'static str {
        match self {
            UploadError::Validation(_) => "ValidationError",
            UploadError::NotFound(_) => "NotFoundError",
            UploadError::Conflict(_) => "ConflictError",
            UploadError::Expired(_) => "ExpiredError",
            UploadError::Forbidden(_) => "ForbiddenError",
            UploadError::Dependency(_) => "DependencyError",
            UploadError::Timeout { .. } => "TimeoutError",
        }
    }
}

impl From<crate::s3::S3ClientError> for UploadError {
    fn from(e: crate::s3::S3ClientError) -> Self {
        UploadError::Dependency(e.to_string())
    }
}

/// Logical category of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Video,
    Document,
}

impl FileType {
    /// Parse a client-supplied file type (case-insensitive)
    pub fn parse(value: &str) -> Result<Self, UploadError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" => Ok(FileType::Image),
            "video" => Ok(FileType::Video),
            "document" => Ok(FileType::Document),
            other => Err(UploadError::Validation(format!(
                "Unsupported file type '{}': must be 'image', 'video', or 'document'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Document => "document",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
