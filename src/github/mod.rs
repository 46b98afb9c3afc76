//! Provider access: the [`RemoteClient`] contract and its GitHub implementation.
//!
//! The downloader only talks to the provider through [`RemoteClient`], so tests
//! (and alternative providers) can stand in for [`GitHubClient`].

mod client;
pub mod link;
pub mod models;
mod paging;
pub mod urls;


pub use client::GitHubClient;
pub use models::{
    ChangedFile, MergeResponse, MergeResult, Permission, PullRequest, PullRequestState,
    Repository, RepositoryPermission, User, UserResult,
};
pub use paging::PagedResult;

use crate::error::Result;
use crate::types::{PullRequestCoordinates, RepositoryName};
use std::path::{Path, PathBuf};

/// Username plus personal access token, sent as HTTP basic credentials
#[derive(Clone)]
pub struct Credentials {
    /// Account login
    pub username: String,
    /// Personal access token
    pub token: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Operations the downloader needs from the provider.
///
/// Credentials, transport and JSON mapping are the implementation's concern.
#[async_trait::async_trait]
pub trait RemoteClient: Send + Sync {
    /// Pull request detail, including the head revision.
    ///
    /// Fails with [`Error::HttpStatus`](crate::Error::HttpStatus) on non-2xx.
    async fn pull_request_detail(&self, coordinates: &PullRequestCoordinates)
    -> Result<PullRequest>;

    /// One page of changed-file metadata.
    ///
    /// A pull request that does not exist yields [`PagedResult::empty`]; other
    /// non-2xx responses fail with an HTTP status error.
    async fn changed_files(
        &self,
        coordinates: &PullRequestCoordinates,
        page: u32,
    ) -> Result<PagedResult<ChangedFile>>;

    /// Fetch the raw bytes at `url` into `target`.
    async fn fetch_file_bytes(&self, url: &str, target: &Path) -> Result<()>;

    /// Fetch the provider-built archive of `repository` at `revision` into `target_dir`.
    ///
    /// `target_dir` must already exist; otherwise no request is made and
    /// `Ok(None)` is returned. On success returns the path of the written archive.
    async fn fetch_revision_archive(
        &self,
        repository: &RepositoryName,
        revision: &str,
        target_dir: &Path,
    ) -> Result<Option<PathBuf>>;
}
