//! Direct Uploadr Library
//!
//! Presigned direct-to-object-storage uploads with session tracking.
//!
//! # Features
//!
//! - **Direct Uploads**: Clients PUT bytes straight to S3-compatible storage
//! - **SigV4 Presigning**: URLs bound to key, content type and TTL
//! - **Session Tracking**: Pending sessions confirmed exactly once, expired by deadline
//! - **JWT Auth**: Bearer-token authentication on the handshake API
//!
//! # Example
//!
//! ```no_run
//! use direct_uploadr::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod metrics;
pub mod s3;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;
pub use upload::{DirectUploadService, UploadError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
