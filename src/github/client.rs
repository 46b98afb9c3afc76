//! reqwest-based [`RemoteClient`] for the GitHub REST API.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use reqwest::header::{ACCEPT, CONTENT_DISPOSITION, LINK};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::config::GitHubConfig;
use crate::error::{Error, Result};
use crate::types::{PullRequestCoordinates, RepositoryName};

use super::models::{
    ChangedFile, ErrorMessage, MergeRequest, MergeResponse, MergeResult, PullRequest,
    PullRequestState, Repository, RepositoryPermission, StateUpdate, User, UserResult,
};
use super::paging::PagedResult;
use super::urls::GitHubUrls;
use super::{Credentials, RemoteClient};

/// Media type for JSON API responses
const MEDIA_TYPE_JSON: &str = "application/vnd.github+json";

/// Media type for raw file content
const MEDIA_TYPE_RAW: &str = "application/vnd.github.raw";

/// Granted OAuth scopes of the token used for a request
const HEADER_OAUTH_SCOPES: &str = "x-oauth-scopes";

/// Expiration of the token used for a request
const HEADER_TOKEN_EXPIRATION: &str = "github-authentication-token-expiration";

/// Suffix of files that are still being written
const PARTIAL_SUFFIX: &str = ".partial";

/// GitHub REST API client authenticated with a personal access token
#[derive(Clone, Debug)]
pub struct GitHubClient {
    http: reqwest::Client,
    urls: GitHubUrls,
    credentials: Credentials,
    merge_message: String,
}

impl GitHubClient {
    /// Create a client for the configured base URL.
    ///
    /// Fails with [`Error::Init`] for a malformed base URL and with
    /// [`Error::Authentication`] for blank credentials.
    pub fn new(config: &GitHubConfig, credentials: Credentials) -> Result<Self> {
        if credentials.username.trim().is_empty() || credentials.token.trim().is_empty() {
            return Err(Error::Authentication(
                "username and access token are required".to_string(),
            ));
        }

        let urls = GitHubUrls::new(&config.base_url)?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeouts.connect_seconds))
            .timeout(Duration::from_secs(config.timeouts.call_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Init(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            urls,
            credentials,
            merge_message: config.merge_message.clone(),
        })
    }

    /// The account behind the credentials, with the scopes granted to the token.
    pub async fn current_user(&self) -> Result<UserResult> {
        let response = self
            .get("current_user", self.urls.current_user(), MEDIA_TYPE_JSON)
            .await?;
        let response = ensure_success("current_user", response).await?;

        let scopes = header_str(&response, HEADER_OAUTH_SCOPES);
        let expiration = header_str(&response, HEADER_TOKEN_EXPIRATION);
        let user: User = read_json("current_user", response).await?;
        Ok(UserResult::new(user, scopes.as_deref(), expiration.as_deref()))
    }

    /// Repositories the authenticated user can access (first page).
    pub async fn user_repos(&self) -> Result<Vec<Repository>> {
        let response = self
            .get("user_repos", self.urls.user_repos(), MEDIA_TYPE_JSON)
            .await?;
        let response = ensure_success("user_repos", response).await?;
        read_json("user_repos", response).await
    }

    /// One page of a repository's pull requests.
    pub async fn pull_requests(
        &self,
        repository: &RepositoryName,
        page: u32,
        state: PullRequestState,
    ) -> Result<PagedResult<PullRequest>> {
        let url = self.urls.pull_requests(repository, page, state);
        self.paged("pull_requests", url, page).await
    }

    async fn paged<T: DeserializeOwned>(
        &self,
        call: &'static str,
        url: Url,
        page: u32,
    ) -> Result<PagedResult<T>> {
        let response = self.get(call, url, MEDIA_TYPE_JSON).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(call, page, "resource not found, returning empty page");
            return Ok(PagedResult::empty());
        }
        let response = ensure_success(call, response).await?;

        let link = header_str(&response, LINK.as_str());
        let items: Vec<T> = read_json(call, response).await?;
        let result = PagedResult::from_link_header(items, page, link.as_deref());
        tracing::debug!(
            call,
            page = result.page,
            max_pages = result.max_pages,
            items = result.items.len(),
            "fetched page"
        );
        Ok(result)
    }

    /// Merge a pull request whose head is still at `sha`.
    ///
    /// A refusal by the provider (not found, not mergeable, head moved) is a
    /// failed [`MergeResult`], not an error.
    pub async fn merge(
        &self,
        coordinates: &PullRequestCoordinates,
        message: &str,
        sha: &str,
    ) -> Result<MergeResult> {
        let body = MergeRequest {
            commit_message: message.to_string(),
            sha: sha.to_string(),
        };
        let request = self
            .request(Method::PUT, self.urls.pull_request_merge(coordinates), MEDIA_TYPE_JSON)
            .json(&body);
        let response = self.send("merge", request).await?;

        if matches!(
            response.status(),
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::CONFLICT
        ) {
            log_error_body("merge", response).await;
            return Ok(MergeResult::failure());
        }
        let response = ensure_success("merge", response).await?;
        let merged: MergeResponse = read_json("merge", response).await?;
        tracing::info!(
            pull_request = %coordinates,
            merged = merged.merged,
            "merge requested"
        );
        Ok(MergeResult::of(merged))
    }

    /// Merge a pull request at its current head with the configured `merge_message`.
    pub async fn merge_head(&self, coordinates: &PullRequestCoordinates) -> Result<MergeResult> {
        let detail = self.pull_request_detail(coordinates).await?;
        let Some(sha) = detail.head_sha() else {
            return Err(Error::Serialization(format!(
                "pull request {} has no head revision",
                coordinates
            )));
        };
        self.merge(coordinates, &self.merge_message, sha).await
    }

    /// Close a pull request without merging it.
    ///
    /// Returns false when the provider refuses (forbidden, not found, unprocessable).
    pub async fn close(&self, coordinates: &PullRequestCoordinates) -> Result<bool> {
        let body = StateUpdate {
            state: PullRequestState::Closed,
        };
        let request = self
            .request(Method::PATCH, self.urls.pull_request_detail(coordinates), MEDIA_TYPE_JSON)
            .json(&body);
        let response = self.send("close", request).await?;

        if matches!(
            response.status(),
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            log_error_body("close", response).await;
            return Ok(false);
        }
        ensure_success("close", response).await?;
        tracing::info!(pull_request = %coordinates, "pull request closed");
        Ok(true)
    }

    /// The authenticated user's permission on `repository`.
    ///
    /// A refused lookup (the user is no collaborator) reports [`RepositoryPermission::none`].
    pub async fn repository_permission(
        &self,
        repository: &RepositoryName,
    ) -> Result<RepositoryPermission> {
        let url = self
            .urls
            .collaborator_permission(repository, &self.credentials.username);
        let response = self.get("repository_permission", url, MEDIA_TYPE_JSON).await?;
        if matches!(
            response.status(),
            StatusCode::FORBIDDEN | StatusCode::NOT_FOUND
        ) {
            log_error_body("repository_permission", response).await;
            return Ok(RepositoryPermission::none());
        }
        let response = ensure_success("repository_permission", response).await?;
        read_json("repository_permission", response).await
    }

    async fn get(&self, call: &'static str, url: Url, accept: &str) -> Result<reqwest::Response> {
        self.send(call, self.request(Method::GET, url, accept)).await
    }

    fn request(&self, method: Method, url: Url, accept: &str) -> RequestBuilder {
        tracing::trace!(%method, %url, "building request");
        self.http
            .request(method, url)
            .header(ACCEPT, accept)
            .basic_auth(&self.credentials.username, Some(&self.credentials.token))
    }

    async fn send(&self, call: &'static str, request: RequestBuilder) -> Result<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| Error::Execution(format!("error on call '{}': {}", call, e)))
    }
}

#[async_trait::async_trait]
impl RemoteClient for GitHubClient {
    async fn pull_request_detail(
        &self,
        coordinates: &PullRequestCoordinates,
    ) -> Result<PullRequest> {
        let url = self.urls.pull_request_detail(coordinates);
        let response = self.get("pull_request_detail", url, MEDIA_TYPE_JSON).await?;
        let response = ensure_success("pull_request_detail", response).await?;
        read_json("pull_request_detail", response).await
    }

    async fn changed_files(
        &self,
        coordinates: &PullRequestCoordinates,
        page: u32,
    ) -> Result<PagedResult<ChangedFile>> {
        let url = self.urls.pull_request_files(coordinates, page);
        self.paged("changed_files", url, page).await
    }

    async fn fetch_file_bytes(&self, url: &str, target: &Path) -> Result<()> {
        let url = Url::parse(url)
            .map_err(|e| Error::Download(format!("invalid content URL {}: {}", url, e)))?;
        let response = self.get("fetch_file_bytes", url, MEDIA_TYPE_RAW).await?;
        let response = ensure_success("fetch_file_bytes", response).await?;

        let written = write_body(response, target).await?;
        tracing::debug!(path = %target.display(), bytes = written, "fetched file content");
        Ok(())
    }

    async fn fetch_revision_archive(
        &self,
        repository: &RepositoryName,
        revision: &str,
        target_dir: &Path,
    ) -> Result<Option<PathBuf>> {
        if !tokio::fs::try_exists(target_dir).await.unwrap_or(false) {
            tracing::error!(
                path = %target_dir.display(),
                "target directory for revision archive does not exist"
            );
            return Ok(None);
        }

        let url = self.urls.zipball(repository, revision);
        let response = self
            .get("fetch_revision_archive", url, MEDIA_TYPE_JSON)
            .await?;
        let response = ensure_success("fetch_revision_archive", response).await?;

        let name = header_str(&response, CONTENT_DISPOSITION.as_str())
            .and_then(|value| archive_name_from_disposition(&value))
            .unwrap_or_else(|| format!("{}-{}.zip", repository.repo(), revision));
        let target = target_dir.join(name);

        let written = write_body(response, &target).await?;
        tracing::info!(
            repository = %repository,
            revision,
            path = %target.display(),
            bytes = written,
            "fetched revision archive"
        );
        Ok(Some(target))
    }
}

/// Turn a non-2xx response into [`Error::HttpStatus`], logging the provider's error body.
async fn ensure_success(
    call: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    log_error_body(call, response).await;
    Err(Error::HttpStatus {
        status: status.as_u16(),
        message: format!("unexpected HTTP status code on call '{}'", call),
    })
}

async fn log_error_body(call: &'static str, response: reqwest::Response) {
    let status = response.status();
    match response.json::<ErrorMessage>().await {
        Ok(error) => tracing::warn!(
            call,
            status = status.as_u16(),
            message = %error.message,
            documentation_url = error.documentation_url.as_deref().unwrap_or("-"),
            "call was not OK"
        ),
        Err(_) => tracing::warn!(call, status = status.as_u16(), "call was not OK, no message"),
    }
}

async fn read_json<T: DeserializeOwned>(call: &'static str, response: reqwest::Response) -> Result<T> {
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::Execution(format!("error reading body of call '{}': {}", call, e)))?;
    serde_json::from_slice(&body).map_err(|e| {
        Error::Serialization(format!("error unmarshalling body of call '{}': {}", call, e))
    })
}

fn header_str(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Stream a response body into `target` via a sibling `.partial` file.
///
/// The final name only appears once every byte has been written.
async fn write_body(mut response: reqwest::Response, target: &Path) -> Result<u64> {
    let partial = partial_path(target);
    let mut file = tokio::fs::File::create(&partial)
        .await
        .map_err(|e| Error::Download(format!("failed to create {}: {}", partial.display(), e)))?;

    let mut written = 0u64;
    loop {
        let chunk = match response.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(Error::Execution(format!("error reading response body: {}", e)));
            }
        };
        file.write_all(&chunk).await.map_err(|e| {
            Error::Download(format!("failed to write {}: {}", partial.display(), e))
        })?;
        written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| Error::Download(format!("failed to flush {}: {}", partial.display(), e)))?;
    drop(file);

    tokio::fs::rename(&partial, target).await.map_err(|e| {
        Error::Download(format!(
            "failed to move {} to {}: {}",
            partial.display(),
            target.display(),
            e
        ))
    })?;

    Ok(written)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

/// Extract a safe `*.zip` file name from a `Content-Disposition` header value.
///
/// Prefers the RFC 5987 `filename*=` form. Directory parts are stripped and a
/// `.zip` extension is appended when missing.
pub(crate) fn archive_name_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in value.split(';').map(str::trim) {
        if let Some(v) = part.strip_prefix("filename*=") {
            let encoded = v.rsplit("''").next().unwrap_or(v);
            extended = urlencoding::decode(encoded).ok().map(|s| s.into_owned());
        } else if let Some(v) = part.strip_prefix("filename=") {
            plain = Some(v.trim_matches('"').to_string());
        }
    }

    let raw = extended.or(plain)?;
    let name = Path::new(&raw).file_name()?.to_str()?.trim().to_string();
    if name.is_empty() || name.starts_with('.') {
        return None;
    }

    if name.to_ascii_lowercase().ends_with(".zip") {
        Some(name)
    } else {
        Some(format!("{}.zip", name))
    }
}
