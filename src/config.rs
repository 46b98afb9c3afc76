//! Configuration types for pullman

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// HTTP client timeouts for calls to the provider
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Timeouts {
    /// Connect timeout in seconds (default: 10)
    #[serde(default = "default_connect_seconds")]
    pub connect_seconds: u64,

    /// Timeout for a complete call in seconds, including the body (default: 30)
    #[serde(default = "default_call_seconds")]
    pub call_seconds: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_seconds: default_connect_seconds(),
            call_seconds: default_call_seconds(),
        }
    }
}

/// Provider (GitHub REST API) settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API base URL (default: "https://api.github.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent header sent with every request (default: "pullman")
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP client timeouts
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Commit message used when merging a pull request (default: "merged via Pullman")
    #[serde(default = "default_merge_message")]
    pub merge_message: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeouts: Timeouts::default(),
            merge_message: default_merge_message(),
        }
    }
}

/// How the background task materializes a pull request archive
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStrategy {
    /// Paginate the changed files and fetch each file's raw content (default)
    #[default]
    PerFile,
    /// Stream the provider's archive of the whole head revision
    WholeRevision,
}

/// Download behavior configuration (store location, concurrency, notifications)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Content store root (default: "./pullman")
    #[serde(default = "default_location")]
    pub location: PathBuf,

    /// Maximum pull requests downloaded at the same time (default: 10)
    #[serde(default = "default_max_simultaneous")]
    pub max_simultaneous: usize,

    /// Maximum single-file downloads in flight across all pull requests (default: 11)
    ///
    /// Independent from `max_simultaneous` so that one pull request with many
    /// files cannot occupy the pull-request pool.
    #[serde(default = "default_max_file_downloads")]
    pub max_file_downloads: usize,

    /// Background strategy (default: per-file)
    #[serde(default)]
    pub strategy: DownloadStrategy,

    /// How long a subscriber may block a notification before it is dropped (default: 5s)
    #[serde(default = "default_subscriber_timeout")]
    pub subscriber_timeout: Duration,

    /// Channel capacity used by `subscribe()` (default: 64)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            max_simultaneous: default_max_simultaneous(),
            max_file_downloads: default_max_file_downloads(),
            strategy: DownloadStrategy::default(),
            subscriber_timeout: default_subscriber_timeout(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Main configuration for [`PullRequestDownloader`](crate::PullRequestDownloader)
///
/// All fields have defaults, so `Config::default()` works for a local setup and
/// partial JSON documents deserialize cleanly.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Download settings
    #[serde(default)]
    pub download: DownloadConfig,
}

impl Config {
    /// Content store root
    pub fn location(&self) -> &PathBuf {
        &self.download.location
    }

    /// Reject values the downloader cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.download.max_simultaneous == 0 {
            return Err(Error::Config {
                message: "max_simultaneous must be at least 1".to_string(),
                key: Some("download.max_simultaneous".to_string()),
            });
        }
        if self.download.max_file_downloads == 0 {
            return Err(Error::Config {
                message: "max_file_downloads must be at least 1".to_string(),
                key: Some("download.max_file_downloads".to_string()),
            });
        }
        if self.download.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be at least 1".to_string(),
                key: Some("download.event_buffer".to_string()),
            });
        }
        if self.github.user_agent.trim().is_empty() {
            return Err(Error::Config {
                message: "user_agent must not be blank".to_string(),
                key: Some("github.user_agent".to_string()),
            });
        }
        if self.github.merge_message.trim().is_empty() {
            return Err(Error::Config {
                message: "merge_message must not be blank".to_string(),
                key: Some("github.merge_message".to_string()),
            });
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    "pullman".to_string()
}

fn default_merge_message() -> String {
    "merged via Pullman".to_string()
}

fn default_connect_seconds() -> u64 {
    10
}

fn default_call_seconds() -> u64 {
    30
}

fn default_location() -> PathBuf {
    PathBuf::from("./pullman")
}

fn default_max_simultaneous() -> usize {
    10
}

fn default_max_file_downloads() -> usize {
    default_max_simultaneous() + 1
}

fn default_subscriber_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_event_buffer() -> usize {
    64
}
