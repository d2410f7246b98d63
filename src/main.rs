//! Direct Uploadr - presigned direct-to-storage upload service

use clap::Parser;
use direct_uploadr::{config::Config, server::Server};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Direct Uploadr - presigned uploads straight to S3-compatible storage
#[derive(Parser, Debug)]
#[command(name = "direct-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(args.log_level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    let config = Config::load(&args.config)?;
    info!(path = ?args.config, "Loaded configuration");

    if args.check_config {
        println!("Configuration OK: {}", args.config.display());
        return Ok(());
    }

    info!("Starting Direct Uploadr v{}", env!("CARGO_PKG_VERSION"));

    let server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
