//! Background session sweeper
//!
//! Periodically expires lapsed pending sessions and evicts terminal ones
//! past the retention window.

use super::service::DirectUploadService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

pub struct SessionSweeper {
    service: Arc<DirectUploadService>,
    interval: Duration,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl SessionSweeper {
    pub fn new(service: Arc<DirectUploadService>) -> Self {
        let interval = service.config().sweep_interval();
        Self::with_interval(service, interval)
    }

    pub fn with_interval(service: Arc<DirectUploadService>, interval: Duration) -> Self {
        Self {
            service,
            interval,
            shutdown_tx: None,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the sweep loop. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let service = self.service.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = service.sweep_expired().await {
                            tracing::warn!(error = %e, "Session sweep failed");
                        }
                    }
                }
            }
            tracing::debug!("Session sweeper stopped");
        });

        tracing::info!(interval_secs = period.as_secs(), "Session sweeper started");
        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
    }

    /// Stop the loop and wait for an in-flight sweep to finish
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
