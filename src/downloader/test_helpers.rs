//! Shared test helpers for creating PullRequestDownloader instances in tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::Semaphore;

use crate::config::{Config, DownloadStrategy};
use crate::downloader::PullRequestDownloader;
use crate::error::{Error, Result};
use crate::github::models::BranchInfo;
use crate::github::{ChangedFile, PagedResult, PullRequest, PullRequestState, RemoteClient};
use crate::types::{
    DownloadState, PullRequestCoordinates, PullRequestDownload, RepositoryName,
};

pub(crate) const HEAD_SHA: &str = "sha1";

/// In-memory provider with failure injection and call counting.
pub(crate) struct FakeRemoteClient {
    head_sha: Option<String>,
    detail_status: Option<u16>,
    pages: Vec<Vec<ChangedFile>>,
    bodies: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    /// A failing fetch waits until this many fetches have started
    fail_after_started: usize,
    blocking: HashSet<String>,
    gate: Semaphore,
    revision_archive: Vec<u8>,
    pub(crate) detail_calls: AtomicUsize,
    pub(crate) page_calls: AtomicUsize,
    pub(crate) fetches_started: AtomicUsize,
    pub(crate) fetches_completed: AtomicUsize,
    pub(crate) revision_calls: AtomicUsize,
}

impl FakeRemoteClient {
    pub(crate) fn new() -> Self {
        Self {
            head_sha: Some(HEAD_SHA.to_string()),
            detail_status: None,
            pages: vec![Vec::new()],
            bodies: HashMap::new(),
            failing: HashSet::new(),
            fail_after_started: 0,
            blocking: HashSet::new(),
            gate: Semaphore::new(0),
            revision_archive: b"PK\x05\x06revision".to_vec(),
            detail_calls: AtomicUsize::new(0),
            page_calls: AtomicUsize::new(0),
            fetches_started: AtomicUsize::new(0),
            fetches_completed: AtomicUsize::new(0),
            revision_calls: AtomicUsize::new(0),
        }
    }

    /// Add a file to the current last page
    pub(crate) fn with_file(mut self, filename: &str, sha: &str, content: &[u8]) -> Self {
        let raw_url = raw_url(filename);
        self.bodies.insert(raw_url.clone(), content.to_vec());
        if let Some(page) = self.pages.last_mut() {
            page.push(ChangedFile {
                sha: sha.to_string(),
                filename: filename.to_string(),
                raw_url,
                status: Some("modified".to_string()),
            });
        }
        self
    }

    /// Start a new page of changed files
    pub(crate) fn next_page(mut self) -> Self {
        self.pages.push(Vec::new());
        self
    }

    /// Fetching `filename` fails once `after_started` fetches have begun
    pub(crate) fn failing(mut self, filename: &str, after_started: usize) -> Self {
        self.failing.insert(raw_url(filename));
        self.fail_after_started = after_started;
        self
    }

    /// Fetching `filename` waits until [`release`](Self::release) is called
    pub(crate) fn blocking(mut self, filename: &str) -> Self {
        self.blocking.insert(raw_url(filename));
        self
    }

    /// Pull request lookup answers with `status`
    pub(crate) fn with_detail_status(mut self, status: u16) -> Self {
        self.detail_status = Some(status);
        self
    }

    /// Pull request lookup reports no head sha
    pub(crate) fn without_head_sha(mut self) -> Self {
        self.head_sha = None;
        self
    }

    /// Let blocked fetches continue
    pub(crate) fn release(&self) {
        self.gate.add_permits(1024);
    }

    /// Let exactly one blocked fetch continue
    pub(crate) fn release_one(&self) {
        self.gate.add_permits(1);
    }

    pub(crate) fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn raw_url(filename: &str) -> String {
    format!("https://raw.example.test/{}/{}", HEAD_SHA, filename)
}

#[async_trait::async_trait]
impl RemoteClient for FakeRemoteClient {
    async fn pull_request_detail(
        &self,
        coordinates: &PullRequestCoordinates,
    ) -> Result<PullRequest> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.detail_status {
            return Err(Error::HttpStatus {
                status,
                message: "unexpected HTTP status code on call 'pull_request_detail'".into(),
            });
        }
        Ok(PullRequest {
            id: 1,
            number: coordinates.number,
            title: "Amazing new feature".into(),
            body: None,
            state: PullRequestState::Open,
            user: None,
            head: BranchInfo {
                label: None,
                git_ref: Some("new-topic".into()),
                sha: self.head_sha.clone(),
            },
            base: BranchInfo {
                label: None,
                git_ref: Some("master".into()),
                sha: Some("base".into()),
            },
            mergeable: Some(true),
        })
    }

    async fn changed_files(
        &self,
        _coordinates: &PullRequestCoordinates,
        page: u32,
    ) -> Result<PagedResult<ChangedFile>> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        let index = page.saturating_sub(1) as usize;
        match self.pages.get(index) {
            Some(items) => Ok(PagedResult {
                items: items.clone(),
                page,
                max_pages: self.pages.len() as u32,
            }),
            None => Ok(PagedResult::empty()),
        }
    }

    async fn fetch_file_bytes(&self, url: &str, target: &Path) -> Result<()> {
        let started = self.fetches_started.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(url, started, "fake fetch started");

        if self.failing.contains(url) {
            while Self::count(&self.fetches_started) < self.fail_after_started {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            return Err(Error::HttpStatus {
                status: 500,
                message: format!("injected failure for {}", url),
            });
        }

        if self.blocking.contains(url) {
            self.gate
                .acquire()
                .await
                .map_err(|_| Error::Execution("gate closed".into()))?
                .forget();
        }

        let body = self
            .bodies
            .get(url)
            .ok_or_else(|| Error::HttpStatus {
                status: 404,
                message: format!("no body for {}", url),
            })?;
        tokio::fs::write(target, body)
            .await
            .map_err(|e| Error::Download(e.to_string()))?;

        self.fetches_completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_revision_archive(
        &self,
        repository: &RepositoryName,
        revision: &str,
        target_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        self.revision_calls.fetch_add(1, Ordering::SeqCst);
        if !target_dir.is_dir() {
            return Ok(None);
        }
        let target = target_dir.join(format!("{}-{}.zip", repository.repo(), revision));
        tokio::fs::write(&target, &self.revision_archive)
            .await
            .map_err(|e| Error::Download(e.to_string()))?;
        Ok(Some(target))
    }
}

/// Configuration rooted in `dir`
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.location = dir.join("store");
    config.download.subscriber_timeout = Duration::from_millis(200);
    config
}

/// Helper to create a downloader over `client` in a fresh temp directory.
/// Returns the downloader, the fake and the tempdir (which must be kept alive).
pub(crate) fn create_test_downloader(
    client: FakeRemoteClient,
) -> (PullRequestDownloader, Arc<FakeRemoteClient>, TempDir) {
    create_test_downloader_with(client, DownloadStrategy::PerFile)
}

pub(crate) fn create_test_downloader_with(
    client: FakeRemoteClient,
    strategy: DownloadStrategy,
) -> (PullRequestDownloader, Arc<FakeRemoteClient>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    config.download.strategy = strategy;
    let client = Arc::new(client);
    let downloader = PullRequestDownloader::new(config, client.clone()).unwrap();
    (downloader, client, temp_dir)
}

pub(crate) fn hello_world(number: u64) -> PullRequestCoordinates {
    PullRequestCoordinates::new(RepositoryName::parse("octocat/Hello-World").unwrap(), number)
}

/// Poll until `key` reaches `state` (panics after 5 seconds).
pub(crate) async fn wait_for_state(
    downloader: &PullRequestDownloader,
    key: &PullRequestDownload,
    state: DownloadState,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let current = downloader.state(key).await;
        if current == Some(state) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {state}, last state {current:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until `condition` holds (panics after 5 seconds).
pub(crate) async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for condition"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Wait until the background task of `key` has left the active map.
pub(crate) async fn wait_until_idle(downloader: &PullRequestDownloader, key: &PullRequestDownload) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while downloader.active.lock().await.contains_key(key) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for background task to finish"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
