//! # Background Sync
//!
//! Periodically flushes the durable queue while the app runs.
//!
//! ## Features
//!
//! - **Periodic Passes**: One pass per configured interval
//! - **Connectivity Aware**: Skips the pass when the oracle reports offline
//! - **Progress Tracking**: Pending count, last sync time and last error
//!
//! ## Usage
//!
//! ```rust,no_run
//! use minetrack::client::sync::SyncService;
//!
//! # async fn example(mut service: SyncService) -> minetrack::shared::Result<()> {
//! service.start()?;
//! let status = service.status().await?;
//! println!("{} actions pending", status.pending_actions);
//! service.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::client::offline::ConnectivityOracle;
use crate::client::sync::{OperationSynchronizer, SyncReport};
use crate::shared::{Result, TrackError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

/// Background sync progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    pub running: bool,
    pub pending_actions: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Passes that actually replayed something
    pub passes: u64,
}

pub struct SyncService {
    synchronizer: Arc<OperationSynchronizer>,
    connectivity: Arc<dyn ConnectivityOracle>,
    interval: Duration,
    status: Arc<RwLock<SyncStatus>>,
    shutdown: Option<watch::Sender<bool>>,
    worker: Option<JoinHandle<()>>,
}

impl SyncService {
    pub fn new(
        synchronizer: Arc<OperationSynchronizer>,
        connectivity: Arc<dyn ConnectivityOracle>,
        interval: Duration,
    ) -> Self {
        Self {
            synchronizer,
            connectivity,
            interval,
            status: Arc::new(RwLock::new(SyncStatus::default())),
            shutdown: None,
            worker: None,
        }
    }

    /// Start the background loop
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(TrackError::Busy("background sync already running"));
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let synchronizer = Arc::clone(&self.synchronizer);
        let connectivity = Arc::clone(&self.connectivity);
        let status = Arc::clone(&self.status);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            tracing::info!("[SYNC] Background sync started (every {:?})", period);
            status.write().await.running = true;

            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        Self::run_pass(&synchronizer, connectivity.as_ref(), &status).await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            status.write().await.running = false;
            tracing::info!("[SYNC] Background sync stopped");
        });

        self.shutdown = Some(shutdown_tx);
        self.worker = Some(handle);
        Ok(())
    }

    /// Stop the loop and wait for the current pass to finish
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Flush right now, regardless of the schedule
    pub async fn force_sync(&self) -> Result<SyncReport> {
        let report = self.synchronizer.sync_to_server().await?;
        Self::record(&self.status, &report).await;
        Ok(report)
    }

    pub async fn status(&self) -> Result<SyncStatus> {
        let pending = self.synchronizer.pending_count().await?;
        let last_sync = self.synchronizer.last_sync_time().await?;

        let mut status = self.status.write().await;
        status.pending_actions = pending;
        if status.last_sync.is_none() {
            status.last_sync = last_sync;
        }
        Ok(status.clone())
    }

    async fn run_pass(
        synchronizer: &OperationSynchronizer,
        connectivity: &dyn ConnectivityOracle,
        status: &RwLock<SyncStatus>,
    ) {
        let pending = match synchronizer.pending_count().await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!("[SYNC] Could not read the queue: {}", e);
                status.write().await.last_error = Some(e.to_string());
                return;
            }
        };
        status.write().await.pending_actions = pending;

        if pending == 0 {
            return;
        }
        if !connectivity.is_online().await {
            tracing::debug!("[SYNC] Offline, {} actions wait for the next pass", pending);
            return;
        }

        match synchronizer.sync_to_server().await {
            Ok(report) => Self::record(status, &report).await,
            Err(e) => {
                tracing::error!("[SYNC] Background pass failed: {}", e);
                status.write().await.last_error = Some(e.to_string());
            }
        }
    }

    async fn record(status: &RwLock<SyncStatus>, report: &SyncReport) {
        let mut status = status.write().await;
        status.pending_actions = report.remaining;
        if report.synced() + report.dropped.len() > 0 {
            status.passes += 1;
        }
        match &report.halted_on {
            Some(reason) => status.last_error = Some(reason.clone()),
            None => {
                status.last_sync = Some(Utc::now());
                status.last_error = report.dropped.last().map(|d| d.reason.clone());
            }
        }
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}
