//! Direct upload service
//!
//! Issues presigned PUT URLs, tracks the resulting sessions and finalizes
//! them on confirmation. Bytes never pass through this service.
//!
//! # Example
//!
//! ```no_run
//! use direct_uploadr::config::UploadConfig;
//! use direct_uploadr::s3::{S3Client, S3ClientConfig};
//! use direct_uploadr::upload::{
//!     ConfirmUploadRequest, DirectUploadService, InMemorySessionStore, PresignedUrlRequest,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = S3Client::anonymous(S3ClientConfig {
//!     bucket: "wedding-media".into(),
//!     region: "us-east-1".into(),
//!     endpoint: Some("http://localhost:9000".into()),
//!     force_path_style: true,
//!     public_base_url: None,
//!     timeout: Duration::from_secs(30),
//! })?;
//! let service = DirectUploadService::new(
//!     UploadConfig::default(),
//!     Arc::new(storage),
//!     Arc::new(InMemorySessionStore::new()),
//! );
//!
//! let presigned = service
//!     .presign(
//!         "user-1",
//!         PresignedUrlRequest {
//!             file_name: "first-dance.mp4".into(),
//!             file_size: 1_048_576,
//!             content_type: "video/mp4".into(),
//!             file_type: "video".into(),
//!             category: None,
//!             expires: None,
//!         },
//!     )
//!     .await?;
//!
//! // ... client PUTs the bytes to presigned.upload_url ...
//!
//! service
//!     .confirm(
//!         "user-1",
//!         ConfirmUploadRequest {
//!             upload_session_id: presigned.upload_session_id,
//!             actual_file_size: 1_048_576,
//!         },
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

use super::policy::UploadPolicy;
use super::session::{SessionState, UploadSession};
use super::store::{SessionStore, SweepStats, Transition};
use super::{FileType, UploadError};
use crate::config::UploadConfig;
use crate::metrics;
use crate::s3::{ObjectStorage, S3ClientError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Body of a presign request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrlRequest {
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
    pub file_type: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Requested URL lifetime in seconds, clamped server-side
    #[serde(default)]
    pub expires: Option<u64>,
}

/// Issued upload slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    pub upload_url: String,
    pub upload_session_id: String,
    pub storage_key: String,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
}

/// Body of a confirm request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmUploadRequest {
    pub upload_session_id: String,
    pub actual_file_size: u64,
}

/// Finalized upload descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedUpload {
    pub upload_session_id: String,
    /// Public URL of the stored object
    pub url: String,
    pub storage_key: String,
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
    pub file_type: FileType,
    pub category: String,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledUpload {
    pub upload_session_id: String,
    pub state: SessionState,
}

/// Session snapshot returned by the progress endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub upload_session_id: String,
    pub state: SessionState,
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
    pub file_type: FileType,
    pub category: String,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Seconds left on the upload URL
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_file_size: Option<u64>,
}

impl UploadProgress {
    fn at(session: UploadSession, now: DateTime<Utc>) -> Self {
        Self {
            state: session.state_at(now),
            expires_in: session.remaining_seconds_at(now),
            upload_session_id: session.id,
            file_name: session.file_name,
            file_size: session.file_size,
            content_type: session.content_type,
            file_type: session.file_type,
            category: session.category,
            storage_key: session.storage_key,
            created_at: session.created_at,
            expires_at: session.expires_at,
            confirmed_at: session.confirmed_at,
            actual_file_size: session.actual_file_size,
        }
    }
}

/// Presign / confirm handshake over an object store and a session store
pub struct DirectUploadService {
    policy: UploadPolicy,
    storage: Arc<dyn ObjectStorage>,
    store: Arc<dyn SessionStore>,
}

impl DirectUploadService {
    pub fn new(
        config: UploadConfig,
        storage: Arc<dyn ObjectStorage>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            policy: UploadPolicy::new(config),
            storage,
            store,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        self.policy.config()
    }

    /// Validate the request, sign a PUT and open a pending session.
    ///
    /// The session is only recorded once signing succeeded.
    #[tracing::instrument(
        name = "upload.presign",
        skip_all,
        fields(
            upload.user = %user_id,
            upload.file_type = %request.file_type,
            upload.file_size = request.file_size,
            upload.session_id = tracing::field::Empty,
            upload.storage_key = tracing::field::Empty
        ),
        err
    )]
    pub async fn presign(
        &self,
        user_id: &str,
        request: PresignedUrlRequest,
    ) -> Result<PresignedUpload, UploadError> {
        let started = Instant::now();
        let result = self.issue(user_id, &request).await;

        let file_type = FileType::parse(&request.file_type)
            .map(|t| t.as_str())
            .unwrap_or("unknown");
        metrics::record_presign(file_type, result.is_ok());
        self.record_outcome("presign", started, &result);

        if let Ok(ref issued) = result {
            let span = tracing::Span::current();
            span.record("upload.session_id", issued.upload_session_id.as_str());
            span.record("upload.storage_key", issued.storage_key.as_str());
        }
        result
    }

    async fn issue(
        &self,
        user_id: &str,
        request: &PresignedUrlRequest,
    ) -> Result<PresignedUpload, UploadError> {
        let upload = self.policy.validate(
            &request.file_name,
            request.file_size,
            &request.content_type,
            &request.file_type,
            request.category.as_deref(),
        )?;
        let ttl = self.policy.ttl_seconds(request.expires);
        let now = Utc::now();
        let storage_key = self.policy.storage_key(user_id, &upload, now);

        let upload_url = self
            .timed("presign", async {
                self.storage
                    .presign_put(&storage_key, &upload.content_type, Duration::from_secs(ttl))
                    .await
                    .map_err(|e| self.storage_error("presign", e))
            })
            .await?;

        let session = UploadSession {
            id: UploadSession::new_id(),
            user_id: user_id.to_string(),
            file_name: upload.file_name,
            file_size: upload.file_size,
            content_type: upload.content_type,
            file_type: upload.file_type,
            category: upload.category,
            storage_key: storage_key.clone(),
            state: SessionState::Pending,
            created_at: now,
            expires_at: now + chrono::Duration::seconds(ttl as i64),
            confirmed_at: None,
            actual_file_size: None,
        };
        let upload_session_id = session.id.clone();
        let expires_at = session.expires_at;

        self.timed("session insert", self.store.insert(session)).await?;

        tracing::info!(
            session_id = %upload_session_id,
            storage_key = %storage_key,
            ttl_seconds = ttl,
            "Issued presigned upload URL"
        );

        Ok(PresignedUpload {
            upload_url,
            upload_session_id,
            storage_key,
            expires_in: ttl,
            expires_at,
        })
    }

    /// Finalize a pending session after the client uploaded the bytes.
    ///
    /// A rejected confirmation leaves the session pending.
    #[tracing::instrument(
        name = "upload.confirm",
        skip_all,
        fields(
            upload.user = %user_id,
            upload.session_id = %request.upload_session_id,
            upload.actual_file_size = request.actual_file_size
        ),
        err
    )]
    pub async fn confirm(
        &self,
        user_id: &str,
        request: ConfirmUploadRequest,
    ) -> Result<ConfirmedUpload, UploadError> {
        let started = Instant::now();
        let result = self.finalize(user_id, &request).await;

        metrics::record_confirm(result.is_ok());
        if let Ok(ref confirmed) = result {
            metrics::record_confirmed_bytes(confirmed.file_type.as_str(), confirmed.file_size);
        }
        self.record_outcome("confirm", started, &result);
        result
    }

    async fn finalize(
        &self,
        user_id: &str,
        request: &ConfirmUploadRequest,
    ) -> Result<ConfirmedUpload, UploadError> {
        let session = self.owned_session(user_id, &request.upload_session_id).await?;
        let now = Utc::now();

        match session.state_at(now) {
            SessionState::Confirmed => return Err(UploadError::Conflict(session.id)),
            SessionState::Expired => return Err(UploadError::Expired(session.id)),
            SessionState::Pending => {}
        }

        self.policy
            .check_size(session.file_size, request.actual_file_size)?;

        if self.policy.config().verify_object {
            self.verify_object(&session, request.actual_file_size).await?;
        }

        let confirmed = self
            .timed(
                "session confirm",
                self.store.transition(
                    &session.id,
                    Transition::Confirm {
                        actual_file_size: request.actual_file_size,
                    },
                    Utc::now(),
                ),
            )
            .await?;

        tracing::info!(
            session_id = %confirmed.id,
            storage_key = %confirmed.storage_key,
            bytes = request.actual_file_size,
            "Upload confirmed"
        );

        Ok(ConfirmedUpload {
            url: self.storage.public_url(&confirmed.storage_key),
            upload_session_id: confirmed.id,
            storage_key: confirmed.storage_key,
            file_name: confirmed.file_name,
            file_size: request.actual_file_size,
            content_type: confirmed.content_type,
            file_type: confirmed.file_type,
            category: confirmed.category,
            confirmed_at: confirmed.confirmed_at.unwrap_or(now),
        })
    }

    async fn verify_object(
        &self,
        session: &UploadSession,
        actual_file_size: u64,
    ) -> Result<(), UploadError> {
        let metadata = self
            .timed("head object", async {
                self.storage
                    .head_object(&session.storage_key)
                    .await
                    .map_err(|e| self.storage_error("head object", e))
            })
            .await?
            .ok_or_else(|| {
                UploadError::Validation(format!(
                    "Uploaded object not found in storage: {}",
                    session.storage_key
                ))
            })?;

        if let Some(length) = metadata.content_length {
            if length != actual_file_size {
                return Err(UploadError::Validation(format!(
                    "Stored object size {} does not match confirmed size {}",
                    length, actual_file_size
                )));
            }
        }

        // compare the MIME essence, parameters are ignored
        if let Some(ref stored) = metadata.content_type {
            let essence = stored.split(';').next().unwrap_or_default().trim();
            if !essence.eq_ignore_ascii_case(&session.content_type) {
                return Err(UploadError::Validation(format!(
                    "Stored object type {} does not match declared type {}",
                    essence, session.content_type
                )));
            }
        }

        tracing::debug!(
            storage_key = %session.storage_key,
            etag = metadata.etag.as_deref().unwrap_or("-"),
            "Verified stored object"
        );
        Ok(())
    }

    /// Abandon a pending session
    #[tracing::instrument(
        name = "upload.cancel",
        skip_all,
        fields(upload.user = %user_id, upload.session_id = %upload_session_id),
        err
    )]
    pub async fn cancel(
        &self,
        user_id: &str,
        upload_session_id: &str,
    ) -> Result<CancelledUpload, UploadError> {
        let started = Instant::now();
        let result = async {
            let session = self.owned_session(user_id, upload_session_id).await?;
            let expired = self
                .timed(
                    "session cancel",
                    self.store
                        .transition(&session.id, Transition::Expire, Utc::now()),
                )
                .await?;
            tracing::info!(session_id = %expired.id, "Upload cancelled");
            Ok(CancelledUpload {
                upload_session_id: expired.id,
                state: expired.state,
            })
        }
        .await;

        metrics::record_cancel(result.is_ok());
        self.record_outcome("cancel", started, &result);
        result
    }

    /// Current state of a session owned by `user_id`
    #[tracing::instrument(
        name = "upload.progress",
        skip_all,
        fields(upload.user = %user_id, upload.session_id = %upload_session_id),
        err
    )]
    pub async fn progress(
        &self,
        user_id: &str,
        upload_session_id: &str,
    ) -> Result<UploadProgress, UploadError> {
        let session = self.owned_session(user_id, upload_session_id).await?;
        Ok(UploadProgress::at(session, Utc::now()))
    }

    /// Expire lapsed sessions and evict old terminal ones
    pub async fn sweep_expired(&self) -> Result<SweepStats, UploadError> {
        let started = Instant::now();
        let stats = self
            .timed(
                "session sweep",
                self.store.sweep(Utc::now(), self.policy.config().retention()),
            )
            .await?;

        metrics::record_sweep(stats.expired, stats.evicted, stats.pending);
        metrics::record_operation_duration("sweep", started.elapsed().as_secs_f64());
        if stats.expired > 0 || stats.evicted > 0 {
            tracing::info!(
                expired = stats.expired,
                evicted = stats.evicted,
                pending = stats.pending,
                "Swept upload sessions"
            );
        }
        Ok(stats)
    }

    async fn owned_session(
        &self,
        user_id: &str,
        upload_session_id: &str,
    ) -> Result<UploadSession, UploadError> {
        if upload_session_id.trim().is_empty() {
            return Err(UploadError::Validation("uploadSessionId is required".into()));
        }

        let session = self
            .timed("session lookup", self.store.get(upload_session_id))
            .await?
            .ok_or_else(|| UploadError::NotFound(upload_session_id.to_string()))?;

        if session.user_id != user_id {
            tracing::warn!(
                session_id = %upload_session_id,
                owner = %session.user_id,
                "Session accessed by another user"
            );
            return Err(UploadError::Forbidden(upload_session_id.to_string()));
        }
        Ok(session)
    }

    /// Bound a store or storage call by the operation timeout
    async fn timed<T, F>(&self, operation: &'static str, future: F) -> Result<T, UploadError>
    where
        F: Future<Output = Result<T, UploadError>>,
    {
        let timeout = self.policy.config().operation_timeout();
        match tokio::time::timeout(timeout, future).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(operation, timeout_secs = timeout.as_secs(), "Operation timed out");
                Err(UploadError::Timeout { operation, timeout })
            }
        }
    }

    fn storage_error(&self, operation: &'static str, error: S3ClientError) -> UploadError {
        match error {
            S3ClientError::Timeout(_) => UploadError::Timeout {
                operation,
                timeout: self.policy.config().operation_timeout(),
            },
            other => {
                tracing::error!(operation, error = %other, "Object storage call failed");
                other.into()
            }
        }
    }

    fn record_outcome<T>(
        &self,
        operation: &str,
        started: Instant,
        result: &Result<T, UploadError>,
    ) {
        metrics::record_operation_duration(operation, started.elapsed().as_secs_f64());
        if let Err(e) = result {
            metrics::record_error(e.class());
        }
    }
}
