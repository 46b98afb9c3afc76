//! Cancellation and shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;
use crate::types::PullRequestDownload;

use super::PullRequestDownloader;

/// Upper bound on waiting for background tasks during shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between checks of the active map while shutting down
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl PullRequestDownloader {
    /// Interrupt a running download.
    ///
    /// Pending file fetches are aborted and the download ends in ERROR. Returns
    /// false when no background task is running for `key`.
    pub async fn cancel(&self, key: &PullRequestDownload) -> bool {
        let active = self.active.lock().await;
        match active.get(key) {
            Some(token) => {
                tracing::info!(download = %key, "cancelling download");
                token.cancel();
                true
            }
            None => {
                tracing::debug!(download = %key, "no running download to cancel");
                false
            }
        }
    }

    /// Gracefully shut down the downloader
    ///
    /// 1. Stops accepting new downloads
    /// 2. Cancels every running download (each ends in ERROR)
    /// 3. Waits for the background tasks to record their outcome (at most 30 seconds)
    /// 4. Drops all subscribers
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        self.shutdown_token.cancel();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_downloads()).await {
            Ok(()) => tracing::info!("all background downloads stopped"),
            Err(_) => tracing::warn!(
                "timeout waiting for background downloads, proceeding with shutdown"
            ),
        }

        self.events.close().await;
        tracing::info!("shutdown complete");
        Ok(())
    }

    async fn wait_for_active_downloads(&self) {
        loop {
            let active_count = self.active.lock().await.len();
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "waiting for background downloads to stop");
            tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
        }
    }
}
