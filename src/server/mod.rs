//! HTTP server module
//!
//! Serves the direct upload API over HTTP/1.1 on tokio + hyper. Each
//! connection runs in its own task; the upload service is shared by handle.
//!
//! # Example
//!
//! ```no_run
//! use direct_uploadr::{config::Config, server::Server};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let server = Server::new(config).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod handlers;
pub mod response;

use crate::auth::jwt::JwtAuthenticator;
use crate::auth::Authenticator;
use crate::config::Config;
use crate::metrics::server::MetricsServer;
use crate::s3::S3Client;
use crate::upload::{DirectUploadService, InMemorySessionStore, SessionSweeper};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// State shared by every connection
pub struct AppState {
    pub service: Arc<DirectUploadService>,
    /// `None` when authentication is disabled
    pub authenticator: Option<Arc<dyn Authenticator>>,
    /// Prefix in front of `/direct-upload`, empty for none
    pub base_path: String,
}

impl AppState {
    /// Build the service stack described by `config`
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        let storage = S3Client::from_storage_config(&config.storage)
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;
        let service = DirectUploadService::new(
            config.upload.clone(),
            Arc::new(storage),
            Arc::new(InMemorySessionStore::new()),
        );
        Self::with_service(config, Arc::new(service))
    }

    /// Use an already built service (custom storage or session store)
    pub fn with_service(
        config: &Config,
        service: Arc<DirectUploadService>,
    ) -> Result<Self, ServerError> {
        let authenticator: Option<Arc<dyn Authenticator>> = if config.auth.enabled {
            // Fail closed: auth enabled without a JWT section is a config error
            let jwt = config.auth.jwt.as_ref().ok_or_else(|| {
                ServerError::ConfigError("auth.enabled requires auth.jwt".into())
            })?;
            let authenticator = JwtAuthenticator::from_config(jwt)
                .map_err(|e| ServerError::ConfigError(e.to_string()))?;
            Some(Arc::new(authenticator))
        } else {
            None
        };

        Ok(Self {
            service,
            authenticator,
            base_path: config.server.base_path.clone(),
        })
    }
}

/// HTTP Server
pub struct Server {
    config: Config,
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Validate `config`, build the service and bind the listener.
    ///
    /// Binding happens immediately, so port 0 resolves to a real port here.
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::ConfigError(e.to_string()))?;
        let state = AppState::from_config(&config)?;
        Self::with_state(config, state).await
    }

    pub async fn with_state(config: Config, state: AppState) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!(address = %local_addr, "Server bound");

        Ok(Self {
            config,
            state: Arc::new(state),
            listener,
            local_addr,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves, then stop the background tasks
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let mut sweeper = SessionSweeper::new(self.state.service.clone());
        sweeper.start();

        let mut metrics_server = self.start_metrics_server().await?;

        info!(
            address = %self.local_addr,
            base_path = %self.state.base_path,
            auth = self.state.authenticator.is_some(),
            "Direct upload server started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };

                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handlers::handle_request(req, state).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            error!(peer = %peer_addr, error = %e, "Error serving connection");
                        }
                    });
                }
            }
        }

        info!("Shutting down server");
        sweeper.shutdown().await;
        if let Some(ref mut server) = metrics_server {
            server.shutdown().await;
        }
        Ok(())
    }

    #[cfg(feature = "metrics")]
    async fn start_metrics_server(&self) -> Result<Option<MetricsServer>, ServerError> {
        if !self.config.metrics.enabled {
            return Ok(None);
        }
        let mut server = MetricsServer::new(self.config.metrics.address.clone());
        server
            .start()
            .await
            .map_err(|e| ServerError::BindError(format!("Metrics server: {}", e)))?;
        Ok(Some(server))
    }

    #[cfg(not(feature = "metrics"))]
    async fn start_metrics_server(&self) -> Result<Option<MetricsServer>, ServerError> {
        Ok(None)
    }
}
