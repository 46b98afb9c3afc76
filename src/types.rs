//! Core types and events

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;

/// Pattern for a repository full name like `octocat/Hello-World`
const REPO_FULL_NAME_PATTERN: &str = r"^(?P<owner>[A-Za-z0-9._-]+)/(?P<repo>[A-Za-z0-9._-]+)$";

/// Pattern for a single owner or repository token
const REPO_TOKEN_PATTERN: &str = r"^[A-Za-z0-9._-]+$";

static REPO_FULL_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(REPO_FULL_NAME_PATTERN).ok());

static REPO_TOKEN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(REPO_TOKEN_PATTERN).ok());

/// Fixed label carried by every [`Event::StateChanged`] notification
pub const STATE_CHANGED_LABEL: &str = "downloads-changed";

/// Owner and name of a repository
///
/// Both parts match `[A-Za-z0-9._-]+`; the only ways to build one are
/// [`RepositoryName::parse`] and [`RepositoryName::new`], which enforce that.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryName {
    owner: String,
    repo: String,
}

impl RepositoryName {
    /// Build a repository name from its two parts, `None` if either violates the token grammar.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Option<Self> {
        let owner = owner.into();
        let repo = repo.into();
        let token = REPO_TOKEN.as_ref()?;
        if token.is_match(&owner) && token.is_match(&repo) {
            Some(Self { owner, repo })
        } else {
            None
        }
    }

    /// Parse a full name expression like `"octocat/Hello-World"`.
    ///
    /// Surrounding whitespace is ignored. Anything else that does not match the
    /// `owner/repo` grammar yields `None`.
    pub fn parse(full_name: &str) -> Option<Self> {
        let captures = REPO_FULL_NAME.as_ref()?.captures(full_name.trim());
        match captures {
            Some(caps) => Some(Self {
                owner: caps["owner"].to_string(),
                repo: caps["repo"].to_string(),
            }),
            None => {
                tracing::warn!(full_name, "unable to parse repository full name");
                None
            }
        }
    }

    /// Repository owner (user or organization)
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name
    pub fn repo(&self) -> &str {
        &self.repo
    }
}

impl std::fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl std::str::FromStr for RepositoryName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid repository name: {}", s))
    }
}

/// Identifies a pull request independent of its (mutable) head revision
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PullRequestCoordinates {
    /// Repository the pull request belongs to
    pub repository_name: RepositoryName,
    /// Pull request number (>= 1)
    pub number: u64,
}

impl PullRequestCoordinates {
    /// Create coordinates for pull request `number` of `repository_name`
    pub fn new(repository_name: RepositoryName, number: u64) -> Self {
        Self {
            repository_name,
            number,
        }
    }
}

impl std::fmt::Display for PullRequestCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repository_name, self.number)
    }
}

/// Key of one pull request download: coordinates plus the head revision at start time
///
/// A new push to the pull request changes the head revision and therefore
/// produces a different key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PullRequestDownload {
    /// The pull request
    pub coordinates: PullRequestCoordinates,
    /// Head commit sha when the download was started
    pub head_sha: String,
}

impl PullRequestDownload {
    /// Create a download key
    pub fn new(coordinates: PullRequestCoordinates, head_sha: impl Into<String>) -> Self {
        Self {
            coordinates,
            head_sha: head_sha.into(),
        }
    }
}

impl std::fmt::Display for PullRequestDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.coordinates, self.head_sha)
    }
}

/// One changed file within a pull request download
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDownload {
    /// The pull request download this file belongs to
    pub parent: PullRequestDownload,
    /// Path of the file within the repository (e.g. "src/main.rs")
    pub filename: String,
    /// Blob sha of the file content
    pub content_hash: String,
}

impl FileDownload {
    /// Create a file descriptor
    pub fn new(
        parent: PullRequestDownload,
        filename: impl Into<String>,
        content_hash: impl Into<String>,
    ) -> Self {
        Self {
            parent,
            filename: filename.into(),
            content_hash: content_hash.into(),
        }
    }
}

/// A file whose bytes have been fetched to local storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadedFile {
    /// What was downloaded
    pub descriptor: FileDownload,
    /// Where the bytes live on disk
    pub local_path: PathBuf,
}

/// Progress of a pull request download
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DownloadState {
    /// Scheduled or in progress
    Running,
    /// Archive fully assembled
    Finished,
    /// Failed; stays visible until the archive is deleted
    Error,
}

impl DownloadState {
    /// Whether the state is terminal (FINISHED or ERROR)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DownloadState::Running)
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DownloadState::Running => "RUNNING",
            DownloadState::Finished => "FINISHED",
            DownloadState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Notification sent to subscribers
///
/// Subscribers are expected to re-read [`downloads()`](crate::PullRequestDownloader::downloads)
/// when they receive one; the event itself carries no state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The download state map changed
    StateChanged {
        /// Monotonically increasing notification number
        id: u64,
        /// Always [`STATE_CHANGED_LABEL`]
        label: String,
    },
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn name_patterns_compile() {
        assert!(REPO_FULL_NAME.is_some());
        assert!(REPO_TOKEN.is_some());
    }

    #[test]
    fn parse_valid_full_names() {
        let cases = [
            ("octocat/Hello-World", "octocat", "Hello-World"),
            ("   blank-user/repo", "blank-user", "repo"),
            ("user/blank-repo    ", "user", "blank-repo"),
            ("funkyUser0815/repo.repo", "funkyUser0815", "repo.repo"),
            ("under_score/a_b", "under_score", "a_b"),
        ];

        for (input, owner, repo) in cases {
            let parsed = RepositoryName::parse(input)
                .unwrap_or_else(|| panic!("expected {input:?} to parse"));
            assert_eq!(parsed.owner(), owner);
            assert_eq!(parsed.repo(), repo);
        }
    }

    #[test]
    fn parse_invalid_full_names() {
        for input in [
            "not a repo full name",
            "",
            "/",
            "owner/",
            "/repo",
            "owner/repo/extra",
            "own er/repo",
            "owner/re po",
            "ow,ner/repo",
        ] {
            assert!(RepositoryName::parse(input).is_none(), "{input:?} should not parse");
        }
    }

    #[test]
    fn parse_round_trips_through_display() {
        let name = RepositoryName::parse("rust-lang/rust").unwrap();
        assert_eq!(name.to_string(), "rust-lang/rust");
        assert_eq!(RepositoryName::parse(&name.to_string()), Some(name));
    }

    #[test]
    fn new_validates_tokens() {
        assert!(RepositoryName::new("octocat", "Hello-World").is_some());
        assert!(RepositoryName::new("", "Hello-World").is_none());
        assert!(RepositoryName::new("octo/cat", "Hello-World").is_none());
    }

    #[test]
    fn download_key_is_structural() {
        let coordinates =
            PullRequestCoordinates::new(RepositoryName::parse("octocat/Hello-World").unwrap(), 1);
        let a = PullRequestDownload::new(coordinates.clone(), "abc");
        let b = PullRequestDownload::new(coordinates.clone(), "abc");
        let newer = PullRequestDownload::new(coordinates, "def");

        let mut map = HashMap::new();
        map.insert(a, DownloadState::Running);
        assert_eq!(map.get(&b), Some(&DownloadState::Running));
        assert_eq!(map.get(&newer), None);
    }

    #[test]
    fn state_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&DownloadState::Finished).unwrap(),
            "\"FINISHED\""
        );
        assert!(DownloadState::Error.is_terminal());
        assert!(!DownloadState::Running.is_terminal());
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::StateChanged {
            id: 7,
            label: STATE_CHANGED_LABEL.to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "state_changed");
        assert_eq!(json["id"], 7);
        assert_eq!(json["label"], "downloads-changed");
    }
}
