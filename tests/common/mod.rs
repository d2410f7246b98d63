//! Shared integration test infrastructure
//!
//! - Server lifecycle on an ephemeral port
//! - JWT token generation
//! - Request helpers for the direct upload API

#![allow(dead_code)]

use direct_uploadr::auth::jwt::Claims;
use direct_uploadr::config::{
    AuthConfig, Config, JwtConfig, MetricsConfig, ServerConfig, StorageConfig, UploadConfig,
};
use direct_uploadr::server::{AppState, Server};
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::oneshot;

/// JWT secret for test tokens
pub const JWT_SECRET: &str = "integration-test-secret-key";

pub const TEST_BUCKET: &str = "test-bucket";

pub const BASE_PATH: &str = "/api";

/// Storage config pointing at `endpoint` with static credentials
pub fn storage_config(endpoint: &str) -> StorageConfig {
    StorageConfig {
        bucket: TEST_BUCKET.into(),
        region: "us-east-1".into(),
        endpoint: Some(endpoint.into()),
        access_key: Some("minioadmin".into()),
        secret_key: Some("minioadmin".into()),
        session_token: None,
        force_path_style: true,
        public_base_url: Some("https://cdn.example.com".into()),
        timeout_seconds: 5,
    }
}

/// Config with JWT auth enabled and the metrics listener off
pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            address: "127.0.0.1:0".into(),
            base_path: BASE_PATH.into(),
        },
        storage: storage_config("http://localhost:9000"),
        auth: AuthConfig {
            enabled: true,
            jwt: Some(JwtConfig {
                secret: Some(JWT_SECRET.into()),
                algorithm: "HS256".into(),
                issuer: None,
                audience: None,
            }),
        },
        upload: UploadConfig::default(),
        metrics: MetricsConfig {
            enabled: false,
            address: "127.0.0.1:0".into(),
        },
    }
}

/// Mint an HS256 token for `subject`
pub fn generate_jwt(subject: &str, expires_in_secs: i64) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = chrono::Utc::now();
    let claims = Claims {
        sub: subject.to_string(),
        exp: (now + chrono::Duration::seconds(expires_in_secs)).timestamp() as usize,
        iat: Some(now.timestamp() as usize),
        iss: None,
        aud: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to encode test token")
}

/// Running server plus an HTTP client
pub struct TestEnv {
    pub server_addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestEnv {
    pub async fn start() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let server = Server::new(config).await.expect("Failed to create server");
        Self::spawn(server).await
    }

    pub async fn with_state(config: Config, state: AppState) -> Self {
        let server = Server::with_state(config, state)
            .await
            .expect("Failed to create server");
        Self::spawn(server).await
    }

    async fn spawn(server: Server) -> Self {
        let server_addr = server.local_addr();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let _ = server
                .run_until(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build client");

        Self {
            server_addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.server_addr, path)
    }

    pub fn api_url(&self, route: &str) -> String {
        self.url(&format!("{}/direct-upload{}", BASE_PATH, route))
    }

    /// POST JSON to an API route, returning status and parsed body
    pub async fn post(&self, route: &str, token: Option<&str>, body: &Value) -> (u16, Value) {
        let mut request = self.client.post(self.api_url(route)).json(body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.expect("Request failed");
        let status = response.status().as_u16();
        (status, response.json().await.expect("Response is not JSON"))
    }

    /// GET an API route, returning status and parsed body
    pub async fn get(&self, route: &str, token: Option<&str>) -> (u16, Value) {
        let mut request = self.client.get(self.api_url(route));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.expect("Request failed");
        let status = response.status().as_u16();
        (status, response.json().await.expect("Response is not JSON"))
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// Presign body for the reference image upload
pub fn image_presign_body(file_size: u64) -> Value {
    serde_json::json!({
        "fileName": "test-image.jpg",
        "fileSize": file_size,
        "contentType": "image/jpeg",
        "fileType": "image",
    })
}
