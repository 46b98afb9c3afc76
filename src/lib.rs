//! # pullman
//!
//! Download the changed files of a GitHub pull request as a single zip archive.
//!
//! ## Design Philosophy
//!
//! pullman is designed to be:
//! - **Deduplicated** - One download per pull request and head revision, however often it is requested
//! - **Restart-safe** - Finished archives are rediscovered from the store layout on startup
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - Consumers subscribe to state changes, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use pullman::{Config, Credentials, PullRequestCoordinates, PullRequestDownloader, RepositoryName};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = PullRequestDownloader::with_github(
//!         Config::default(),
//!         Credentials::new("octocat", "ghp_your_token"),
//!     )?;
//!
//!     // Subscribe to state changes
//!     let mut events = downloader.subscribe().await;
//!     let observer = downloader.clone();
//!     tokio::spawn(async move {
//!         while events.recv().await.is_some() {
//!             println!("downloads: {:?}", observer.downloads().await);
//!         }
//!     });
//!
//!     let repository = RepositoryName::parse("octocat/Hello-World").ok_or("bad name")?;
//!     let key = downloader
//!         .start_download(PullRequestCoordinates::new(repository, 1347))
//!         .await?;
//!     println!("started {}", key);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Download orchestration (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// GitHub REST API access
pub mod github;
/// On-disk content store
pub mod store;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, DownloadConfig, DownloadStrategy, GitHubConfig};
pub use downloader::{EventFanout, PullRequestDownloader};
pub use error::{Error, Result};
pub use github::{
    Credentials, GitHubClient, MergeResult, PagedResult, RemoteClient, RepositoryPermission,
};
pub use store::ContentStore;
pub use types::{
    DownloadState, DownloadedFile, Event, FileDownload, PullRequestCoordinates,
    PullRequestDownload, RepositoryName,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use pullman::{Config, Credentials, PullRequestDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader =
///         PullRequestDownloader::with_github(Config::default(), Credentials::new("octocat", "token"))?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: PullRequestDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("received SIGINT");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("received SIGTERM");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
