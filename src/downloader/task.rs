//! Background download of one pull request.
//!
//! Per-file strategy:
//! 1. Page through the changed files until the last page
//! 2. Fetch every file on the file pool, consuming results in completion order
//! 3. Zip the fetched files into the archive
//!
//! Whole-revision strategy streams the provider's archive of the head revision
//! straight into the revision directory.
//!
//! Any failure (or cancellation) aborts the sibling fetches and ends the
//! download in ERROR; nothing is retried.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::DownloadStrategy;
use crate::error::{Error, Result};
use crate::github::RemoteClient;
use crate::store::ContentStore;
use crate::types::{DownloadState, DownloadedFile, FileDownload, PullRequestDownload};

use super::PullRequestDownloader;

/// A changed file waiting to be fetched
struct PendingFile {
    descriptor: FileDownload,
    raw_url: String,
}

/// Spawn the background task for `key`.
///
/// The task records the outcome in the state map, drops the key from the
/// active map and notifies subscribers, also when the download itself panics.
pub(super) fn spawn_download(
    downloader: PullRequestDownloader,
    key: PullRequestDownload,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        let worker = tokio::spawn(run(downloader.clone(), key.clone(), token));
        let outcome = match worker.await {
            Ok(outcome) => outcome,
            Err(e) => Err(Error::Download(format!("download task failed: {}", e))),
        };
        downloader.complete(&key, outcome).await;
    });
}

async fn run(
    downloader: PullRequestDownloader,
    key: PullRequestDownload,
    token: CancellationToken,
) -> Result<PathBuf> {
    // Wait for a pull request slot, unless cancelled first
    let _permit = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(Error::Cancelled),
        permit = downloader.pools.pull_requests.clone().acquire_owned() => {
            permit.map_err(|_| Error::Cancelled)?
        }
    };

    match downloader.config.download.strategy {
        DownloadStrategy::PerFile => download_per_file(&downloader, &key, &token).await,
        DownloadStrategy::WholeRevision => {
            download_whole_revision(&downloader, &key, &token).await
        }
    }
}

async fn download_per_file(
    downloader: &PullRequestDownloader,
    key: &PullRequestDownload,
    token: &CancellationToken,
) -> Result<PathBuf> {
    let pending = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(Error::Cancelled),
        pending = collect_changed_files(downloader.client.as_ref(), key) => pending?,
    };
    tracing::debug!(download = %key, files = pending.len(), "collected changed files");

    let mut tasks = JoinSet::new();
    for file in pending {
        tasks.spawn(fetch_file(
            Arc::clone(&downloader.client),
            Arc::clone(&downloader.store),
            Arc::clone(&downloader.pools.files),
            file,
        ));
    }

    // Completion order, not submission order
    let mut downloaded = Vec::with_capacity(tasks.len());
    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => {
                abort_siblings(&mut tasks, key);
                return Err(Error::Cancelled);
            }
            next = tasks.join_next() => next,
        };

        match next {
            None => break,
            Some(Ok(Ok(file))) => {
                tracing::debug!(
                    download = %key,
                    file = %file.descriptor.filename,
                    "file fetched"
                );
                downloaded.push(file);
            }
            Some(Ok(Err(e))) => {
                abort_siblings(&mut tasks, key);
                return Err(e);
            }
            Some(Err(e)) => {
                abort_siblings(&mut tasks, key);
                return Err(Error::Download(format!("file fetch task failed: {}", e)));
            }
        }
    }

    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let store = Arc::clone(&downloader.store);
    let archive_key = key.clone();
    tokio::task::spawn_blocking(move || store.assemble_archive(&archive_key, &downloaded))
        .await
        .map_err(|e| Error::storage(downloader.store.root(), format!("assembly task failed: {}", e)))?
}

async fn download_whole_revision(
    downloader: &PullRequestDownloader,
    key: &PullRequestDownload,
    token: &CancellationToken,
) -> Result<PathBuf> {
    let dir = downloader.store.revision_dir(key)?;
    let fetch = downloader.client.fetch_revision_archive(
        &key.coordinates.repository_name,
        &key.head_sha,
        &dir,
    );

    let written = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(Error::Cancelled),
        written = fetch => written?,
    };
    written.ok_or_else(|| Error::storage(&dir, "revision archive was not written"))
}

/// Page through the changed files, starting at page 1.
async fn collect_changed_files(
    client: &dyn RemoteClient,
    key: &PullRequestDownload,
) -> Result<Vec<PendingFile>> {
    let mut pending = Vec::new();
    let mut page = 1;
    loop {
        let result = client.changed_files(&key.coordinates, page).await?;
        tracing::debug!(
            download = %key,
            page = result.page,
            max_pages = result.max_pages,
            files = result.items.len(),
            "fetched changed files page"
        );
        let has_next = result.has_next();
        pending.extend(result.items.into_iter().map(|file| PendingFile {
            descriptor: FileDownload::new(key.clone(), file.filename, file.sha),
            raw_url: file.raw_url,
        }));
        if !has_next {
            break;
        }
        page += 1;
    }
    Ok(pending)
}

async fn fetch_file(
    client: Arc<dyn RemoteClient>,
    store: Arc<ContentStore>,
    permits: Arc<Semaphore>,
    file: PendingFile,
) -> Result<DownloadedFile> {
    let _permit = permits.acquire_owned().await.map_err(|_| Error::Cancelled)?;
    let target = store.path_for_file(&file.descriptor)?;
    client.fetch_file_bytes(&file.raw_url, &target).await?;
    Ok(DownloadedFile {
        descriptor: file.descriptor,
        local_path: target,
    })
}

fn abort_siblings(tasks: &mut JoinSet<Result<DownloadedFile>>, key: &PullRequestDownload) {
    if !tasks.is_empty() {
        tracing::debug!(download = %key, outstanding = tasks.len(), "cancelling sibling fetches");
    }
    tasks.abort_all();
}

impl PullRequestDownloader {
    /// Record the outcome of a background task and notify subscribers.
    async fn complete(&self, key: &PullRequestDownload, outcome: Result<PathBuf>) {
        let state = match outcome {
            Ok(path) => {
                tracing::info!(download = %key, path = %path.display(), "download finished");
                DownloadState::Finished
            }
            Err(Error::Cancelled) => {
                tracing::warn!(download = %key, "download cancelled");
                DownloadState::Error
            }
            Err(e) => {
                tracing::error!(download = %key, error = %e, "download failed");
                DownloadState::Error
            }
        };

        // The key leaves the active map before its terminal state is visible
        {
            let mut states = self.states.lock().await;
            self.active.lock().await.remove(key);
            states.insert(key.clone(), state);
        }
        self.events.publish();
    }
}
