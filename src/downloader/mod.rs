//! Pull request download orchestration.
//!
//! The `PullRequestDownloader` struct and its methods are organized by concern:
//! - [`task`] - Background download of one pull request (both strategies)
//! - [`events`] - Subscriber fan-out
//! - [`lifecycle`] - Cancellation and shutdown coordination
//!
//! Every download is keyed by [`PullRequestDownload`] (coordinates plus head
//! revision). The state map admits at most one RUNNING entry per key, so racing
//! callers schedule exactly one background task.

mod events;
mod lifecycle;
mod task;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use events::EventFanout;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::github::{Credentials, GitHubClient, RemoteClient};
use crate::store::ContentStore;
use crate::types::{DownloadState, Event, PullRequestCoordinates, PullRequestDownload};

/// Map of every tracked download to its state
pub(crate) type StateMap = Arc<Mutex<HashMap<PullRequestDownload, DownloadState>>>;

/// Map of running downloads to their cancellation tokens
pub(crate) type ActiveMap = Arc<Mutex<HashMap<PullRequestDownload, CancellationToken>>>;

/// Bounded worker pools
#[derive(Clone)]
pub(crate) struct Pools {
    /// Pull requests downloading at the same time (`max_simultaneous`)
    pub(crate) pull_requests: Arc<Semaphore>,
    /// Single-file fetches in flight across all pull requests (`max_file_downloads`)
    pub(crate) files: Arc<Semaphore>,
}

/// Download orchestrator (cloneable - all fields are Arc-wrapped)
///
/// The entry points (`start_download`, `downloads`, `find_archive`,
/// `delete_archive`, `register_subscriber`) never wait for a download to finish.
#[derive(Clone)]
pub struct PullRequestDownloader {
    /// Provider access
    pub(crate) client: Arc<dyn RemoteClient>,
    /// On-disk layout and archive assembly
    pub(crate) store: Arc<ContentStore>,
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Every tracked download; the only shared mutable state
    pub(crate) states: StateMap,
    /// Cancellation tokens of downloads with a live background task
    pub(crate) active: ActiveMap,
    /// Worker pool bounds
    pub(crate) pools: Pools,
    /// Subscriber notifications
    pub(crate) events: EventFanout,
    /// Parent of every per-download token, cancelled on shutdown
    pub(crate) shutdown_token: CancellationToken,
    /// Set to false during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl PullRequestDownloader {
    /// Create a downloader talking to the provider through `client`.
    ///
    /// Opens the content store at the configured location and seeds the state
    /// map with every archive already on disk as FINISHED.
    pub fn new(config: Config, client: Arc<dyn RemoteClient>) -> Result<Self> {
        config.validate()?;

        let store = ContentStore::new(&config.download.location)?;
        let restored: HashMap<PullRequestDownload, DownloadState> = store
            .find_finished()
            .into_iter()
            .map(|key| (key, DownloadState::Finished))
            .collect();
        if !restored.is_empty() {
            tracing::info!(
                count = restored.len(),
                root = %store.root().display(),
                "restored finished downloads from disk"
            );
        }

        let pools = Pools {
            pull_requests: Arc::new(Semaphore::new(config.download.max_simultaneous)),
            files: Arc::new(Semaphore::new(config.download.max_file_downloads)),
        };
        let events = EventFanout::new(config.download.subscriber_timeout);

        Ok(Self {
            client,
            store: Arc::new(store),
            config: Arc::new(config),
            states: Arc::new(Mutex::new(restored)),
            active: Arc::new(Mutex::new(HashMap::new())),
            pools,
            events,
            shutdown_token: CancellationToken::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Create a downloader backed by [`GitHubClient`] with the configured GitHub settings.
    pub fn with_github(config: Config, credentials: Credentials) -> Result<Self> {
        let client = GitHubClient::new(&config.github, credentials)?;
        Self::new(config, Arc::new(client))
    }

    /// Start downloading a pull request at its current head revision.
    ///
    /// Looks up the head revision, then inserts the key as RUNNING only if it is
    /// not tracked yet and schedules the background task. A key that is already
    /// RUNNING, FINISHED or ERROR is left alone. Returns the key either way.
    ///
    /// # Errors
    ///
    /// Failures of the pull request lookup are returned as is and create no key.
    /// After [`shutdown`](Self::shutdown) the call fails with [`Error::Cancelled`].
    pub async fn start_download(
        &self,
        coordinates: PullRequestCoordinates,
    ) -> Result<PullRequestDownload> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            tracing::warn!(pull_request = %coordinates, "not accepting new downloads");
            return Err(Error::Cancelled);
        }

        let detail = self.client.pull_request_detail(&coordinates).await?;
        let head_sha = detail.head_sha().ok_or_else(|| {
            Error::Serialization(format!(
                "pull request {} has no head revision",
                coordinates
            ))
        })?;
        let key = PullRequestDownload::new(coordinates, head_sha);

        // Lock order is always states, then active
        let token = {
            let mut states = self.states.lock().await;
            match states.entry(key.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(DownloadState::Running);
                    let token = self.shutdown_token.child_token();
                    self.active.lock().await.insert(key.clone(), token.clone());
                    Some(token)
                }
                Entry::Occupied(entry) => {
                    tracing::info!(
                        download = %key,
                        state = %entry.get(),
                        "download already tracked, not starting again"
                    );
                    None
                }
            }
        };

        if let Some(token) = token {
            tracing::info!(download = %key, strategy = ?self.config.download.strategy, "download started");
            self.events.publish();
            task::spawn_download(self.clone(), key.clone(), token);
        }

        Ok(key)
    }

    /// Point-in-time copy of every tracked download and its state.
    pub async fn downloads(&self) -> HashMap<PullRequestDownload, DownloadState> {
        self.states.lock().await.clone()
    }

    /// Current state of one download
    pub async fn state(&self, key: &PullRequestDownload) -> Option<DownloadState> {
        self.states.lock().await.get(key).copied()
    }

    /// Archive of a download, if it exists on disk.
    pub fn find_archive(&self, key: &PullRequestDownload) -> Option<PathBuf> {
        self.store.find_archive(key)
    }

    /// Delete a download's archive and stop tracking it.
    ///
    /// Refused while the download is RUNNING (returns `Ok(false)` and changes
    /// nothing). Otherwise the archive is removed and the key dropped from the
    /// state map, so the pull request can be downloaded again. Returns whether
    /// anything was removed.
    pub async fn delete_archive(&self, key: &PullRequestDownload) -> Result<bool> {
        let removed = {
            let mut states = self.states.lock().await;
            if states.get(key) == Some(&DownloadState::Running) {
                tracing::warn!(download = %key, "refusing to delete archive of running download");
                return Ok(false);
            }
            // Still under the guard: a restart must not race the file removal
            let store = Arc::clone(&self.store);
            let archive_key = key.clone();
            let file_removed = tokio::task::spawn_blocking(move || store.remove_archive(&archive_key))
                .await
                .map_err(|e| {
                    Error::storage(self.store.root(), format!("delete task failed: {}", e))
                })??;
            let tracked = states.remove(key).is_some();
            file_removed || tracked
        };

        if removed {
            tracing::info!(download = %key, "download deleted");
            self.events.publish();
        }
        Ok(removed)
    }

    /// Add a subscriber that is notified on every state change.
    ///
    /// The subscriber is dropped once its receiver is closed or it fails to
    /// accept a notification within the configured timeout. Returns its id.
    pub async fn register_subscriber(&self, sender: mpsc::Sender<Event>) -> u64 {
        self.events.register(sender).await
    }

    /// Create a channel sized by `event_buffer` and register it as a subscriber.
    pub async fn subscribe(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(self.config.download.event_buffer);
        self.events.register(tx).await;
        rx
    }

    /// The content store backing this downloader
    pub fn store(&self) -> &ContentStore {
        &self.store
    }
}

impl std::fmt::Debug for PullRequestDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullRequestDownloader")
            .field("store", &self.store)
            .field("strategy", &self.config.download.strategy)
            .finish_non_exhaustive()
    }
}
