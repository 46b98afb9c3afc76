//! GitHub REST API payloads.
//!
//! Only the fields pullman reads are modelled; unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// Pull request state filter / value
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    /// Open pull requests
    #[default]
    Open,
    /// Closed (including merged) pull requests
    Closed,
    /// Both (only valid as a list filter)
    All,
}

impl PullRequestState {
    /// Query parameter value
    pub fn as_str(&self) -> &'static str {
        match self {
            PullRequestState::Open => "open",
            PullRequestState::Closed => "closed",
            PullRequestState::All => "all",
        }
    }
}

/// A user account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Login name
    pub login: String,
    /// Numeric account id
    #[serde(default)]
    pub id: Option<u64>,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
}

/// A repository
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Numeric repository id
    pub id: u64,
    /// Short name ("Hello-World")
    pub name: String,
    /// Full name ("octocat/Hello-World")
    pub full_name: String,
    /// Whether the repository is private
    #[serde(default)]
    pub private: bool,
    /// Owning account
    pub owner: User,
}

/// One side (head or base) of a pull request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// "owner:branch"
    #[serde(default)]
    pub label: Option<String>,
    /// Branch name
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
    /// Commit sha
    #[serde(default)]
    pub sha: Option<String>,
}

/// A pull request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Numeric id
    pub id: u64,
    /// Number within the repository
    pub number: u64,
    /// Title
    #[serde(default)]
    pub title: String,
    /// Description
    #[serde(default)]
    pub body: Option<String>,
    /// Open or closed
    #[serde(default)]
    pub state: PullRequestState,
    /// Author
    #[serde(default)]
    pub user: Option<User>,
    /// Source branch
    pub head: BranchInfo,
    /// Target branch
    pub base: BranchInfo,
    /// Whether the provider can merge the head cleanly; `None` while it is still computing
    #[serde(default)]
    pub mergeable: Option<bool>,
}

impl PullRequest {
    /// Head commit sha, if the provider reported one
    pub fn head_sha(&self) -> Option<&str> {
        self.head.sha.as_deref().filter(|sha| !sha.is_empty())
    }
}

/// One changed file of a pull request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    /// Blob sha of the file content
    pub sha: String,
    /// Path within the repository
    pub filename: String,
    /// Absolute URL of the raw content at the head revision
    pub raw_url: String,
    /// "added", "modified", "removed", ...
    #[serde(default)]
    pub status: Option<String>,
}

/// Error body returned with non-2xx responses
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Human-readable message
    pub message: String,
    /// Link to the relevant documentation
    #[serde(default)]
    pub documentation_url: Option<String>,
}

/// Body of `PUT /repos/{owner}/{repo}/pulls/{number}/merge`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MergeRequest {
    /// Message of the merge commit
    pub commit_message: String,
    /// Head sha the pull request must still point at
    pub sha: String,
}

/// Provider answer to a merge request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResponse {
    /// Sha of the merge commit
    #[serde(default)]
    pub sha: Option<String>,
    /// Whether the pull request was merged
    #[serde(default)]
    pub merged: bool,
    /// Provider message
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome of [`GitHubClient::merge`](super::GitHubClient::merge)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeResult {
    response: Option<MergeResponse>,
}

impl MergeResult {
    pub(crate) fn of(response: MergeResponse) -> Self {
        Self {
            response: Some(response),
        }
    }

    pub(crate) fn failure() -> Self {
        Self { response: None }
    }

    /// True only when the provider answered and reported the pull request as merged
    pub fn is_successful(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.merged)
    }

    /// The provider's answer, absent when the merge was refused
    pub fn response(&self) -> Option<&MergeResponse> {
        self.response.as_ref()
    }
}

/// Body of `PATCH /repos/{owner}/{repo}/pulls/{number}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct StateUpdate {
    pub(crate) state: PullRequestState,
}

/// Access level on a repository
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Full control
    Admin,
    /// Push access (merging, closing)
    Write,
    /// Read-only
    Read,
    /// No access
    None,
}

/// The authenticated user's permission on a repository
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPermission {
    /// Effective permission
    pub permission: Permission,
    /// Role name ("admin", "maintain", "write", "triage", "read")
    #[serde(default)]
    pub role_name: Option<String>,
}

impl RepositoryPermission {
    /// No access; what a refused permission lookup reports
    pub fn none() -> Self {
        Self {
            permission: Permission::None,
            role_name: Some("none".to_string()),
        }
    }

    /// Whether the user may merge or close pull requests
    pub fn can_write(&self) -> bool {
        matches!(self.permission, Permission::Admin | Permission::Write)
    }
}

/// The authenticated user plus what the token grants
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserResult {
    /// The account the credential belongs to
    pub user: User,
    /// OAuth scopes granted to the token (`X-OAuth-Scopes`)
    pub scopes: Vec<String>,
    /// Token expiration as reported by the provider, if any
    pub token_expiration: Option<String>,
}

impl UserResult {
    /// Split the comma-separated scopes header.
    pub(crate) fn new(user: User, scopes: Option<&str>, token_expiration: Option<&str>) -> Self {
        let scopes = scopes
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|scope| !scope.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            user,
            scopes,
            token_expiration: token_expiration.map(str::to_string),
        }
    }
}
