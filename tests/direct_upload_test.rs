//! Upload handshake properties
//!
//! Exercises `DirectUploadService` directly with in-process storage fakes:
//! - Distinct sessions and keys per presign
//! - Expiry after the TTL
//! - Exactly one winner among concurrent confirmations
//! - Storage failures and timeouts

use async_trait::async_trait;
use direct_uploadr::config::UploadConfig;
use direct_uploadr::s3::{ObjectMetadata, ObjectStorage, S3ClientError};
use direct_uploadr::upload::{
    ConfirmUploadRequest, DirectUploadService, InMemorySessionStore, PresignedUrlRequest,
    SessionState, UploadError,
};
use std::sync::Arc;
use std::time::Duration;

/// Signs deterministic fake URLs
struct LocalStorage;

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn presign_put(
        &self,
        key: &str,
        _content_type: &str,
        expires_in: Duration,
    ) -> Result<String, S3ClientError> {
        Ok(format!(
            "http://store.local/{}?X-Amz-Expires={}",
            key,
            expires_in.as_secs()
        ))
    }

    async fn head_object(&self, _key: &str) -> Result<Option<ObjectMetadata>, S3ClientError> {
        Ok(None)
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://store.local/{}", key)
    }
}

/// Every call fails as if the store were unreachable
struct UnreachableStorage;

#[async_trait]
impl ObjectStorage for UnreachableStorage {
    async fn presign_put(
        &self,
        _key: &str,
        _content_type: &str,
        _expires_in: Duration,
    ) -> Result<String, S3ClientError> {
        Err(S3ClientError::RequestError("connection refused".into()))
    }

    async fn head_object(&self, _key: &str) -> Result<Option<ObjectMetadata>, S3ClientError> {
        Err(S3ClientError::RequestError("connection refused".into()))
    }

    fn public_url(&self, key: &str) -> String {
        key.to_string()
    }
}

/// Never answers within the operation timeout
struct StalledStorage;

#[async_trait]
impl ObjectStorage for StalledStorage {
    async fn presign_put(
        &self,
        key: &str,
        _content_type: &str,
        _expires_in: Duration,
    ) -> Result<String, S3ClientError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(key.to_string())
    }

    async fn head_object(&self, _key: &str) -> Result<Option<ObjectMetadata>, S3ClientError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(None)
    }

    fn public_url(&self, key: &str) -> String {
        key.to_string()
    }
}

fn service_with(
    config: UploadConfig,
    storage: Arc<dyn ObjectStorage>,
) -> (Arc<DirectUploadService>, Arc<InMemorySessionStore>) {
    let store = Arc::new(InMemorySessionStore::new());
    let service = Arc::new(DirectUploadService::new(config, storage, store.clone()));
    (service, store)
}

fn local_service() -> (Arc<DirectUploadService>, Arc<InMemorySessionStore>) {
    service_with(UploadConfig::default(), Arc::new(LocalStorage))
}

fn video_request(size: u64) -> PresignedUrlRequest {
    PresignedUrlRequest {
        file_name: "first-dance.mp4".into(),
        file_size: size,
        content_type: "video/mp4".into(),
        file_type: "video".into(),
        category: Some("ceremony".into()),
        expires: None,
    }
}

fn confirm(id: &str, size: u64) -> ConfirmUploadRequest {
    ConfirmUploadRequest {
        upload_session_id: id.to_string(),
        actual_file_size: size,
    }
}

#[tokio::test]
async fn test_two_presigns_never_share_id_or_key() {
    let (service, store) = local_service();

    let a = service.presign("user-1", video_request(4096)).await.unwrap();
    let b = service.presign("user-1", video_request(4096)).await.unwrap();

    assert_ne!(a.upload_session_id, b.upload_session_id);
    assert_ne!(a.storage_key, b.storage_key);
    assert!(a.storage_key.starts_with("uploads/videos/ceremony/user-1/"));
    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_confirm_unknown_session_is_not_found() {
    let (service, _) = local_service();
    let result = service.confirm("user-1", confirm("missing", 1)).await;
    assert!(matches!(result, Err(UploadError::NotFound(_))));
}

#[tokio::test]
async fn test_confirm_after_ttl_is_expired() {
    let config = UploadConfig {
        min_ttl_seconds: 1,
        ..UploadConfig::default()
    };
    let (service, _) = service_with(config, Arc::new(LocalStorage));

    let mut request = video_request(4096);
    request.expires = Some(1);
    let issued = service.presign("user-1", request).await.unwrap();
    assert_eq!(issued.expires_in, 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let result = service
        .confirm("user-1", confirm(&issued.upload_session_id, 4096))
        .await;
    assert!(matches!(result, Err(UploadError::Expired(_))));

    let progress = service
        .progress("user-1", &issued.upload_session_id)
        .await
        .unwrap();
    assert_eq!(progress.state, SessionState::Expired);
    assert_eq!(progress.expires_in, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirms_have_exactly_one_winner() {
    let (service, _) = local_service();
    let issued = service.presign("user-1", video_request(4096)).await.unwrap();

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            let id = issued.upload_session_id.clone();
            tokio::spawn(async move { service.confirm("user-1", confirm(&id, 4096)).await })
        })
        .collect();

    let results = futures::future::join_all(attempts).await;
    let successes = results
        .iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Ok(Err(UploadError::Conflict(_)))))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 7);
}

#[tokio::test]
async fn test_size_mismatch_leaves_session_pending() {
    let (service, _) = local_service();
    let issued = service.presign("user-1", video_request(4096)).await.unwrap();

    let result = service
        .confirm("user-1", confirm(&issued.upload_session_id, 4097))
        .await;
    assert!(matches!(result, Err(UploadError::Validation(_))));

    let progress = service
        .progress("user-1", &issued.upload_session_id)
        .await
        .unwrap();
    assert_eq!(progress.state, SessionState::Pending);
}

#[tokio::test]
async fn test_rejected_presign_creates_no_session() {
    let (service, store) = local_service();

    let result = service
        .presign("user-1", video_request(600 * 1024 * 1024))
        .await;
    assert!(matches!(result, Err(UploadError::Validation(_))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unreachable_storage_is_dependency_error() {
    let (service, store) = service_with(UploadConfig::default(), Arc::new(UnreachableStorage));

    let result = service.presign("user-1", video_request(4096)).await;
    assert!(matches!(result, Err(UploadError::Dependency(_))));
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_stalled_storage_times_out() {
    let config = UploadConfig {
        operation_timeout_seconds: 1,
        ..UploadConfig::default()
    };
    let (service, store) = service_with(config, Arc::new(StalledStorage));

    let result = service.presign("user-1", video_request(4096)).await;
    match result {
        Err(UploadError::Timeout { operation, timeout }) => {
            assert_eq!(operation, "presign");
            assert_eq!(timeout, Duration::from_secs(1));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_sweep_expires_and_evicts() {
    let config = UploadConfig {
        min_ttl_seconds: 1,
        retention_seconds: 0,
        ..UploadConfig::default()
    };
    let (service, store) = service_with(config, Arc::new(LocalStorage));

    let mut request = video_request(4096);
    request.expires = Some(1);
    service.presign("user-1", request).await.unwrap();
    service.presign("user-1", video_request(4096)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;

    // zero retention: the lapsed session is expired and evicted in one pass
    let stats = service.sweep_expired().await.unwrap();
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.pending, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_confirm_after_eviction_is_not_found() {
    let config = UploadConfig {
        min_ttl_seconds: 1,
        retention_seconds: 0,
        ..UploadConfig::default()
    };
    let (service, _store) = service_with(config, Arc::new(LocalStorage));

    let mut request = video_request(4096);
    request.expires = Some(1);
    let issued = service.presign("user-1", request).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let id = issued.upload_session_id;
    let result = service.confirm("user-1", confirm(&id, 4096)).await;
    assert!(matches!(result, Err(UploadError::Expired(_))));

    service.sweep_expired().await.unwrap();
    let result = service.confirm("user-1", confirm(&id, 4096)).await;
    assert!(matches!(result, Err(UploadError::NotFound(_))));
}
