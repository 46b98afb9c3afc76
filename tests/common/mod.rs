//! Common test utilities for pullman end-to-end tests

#![allow(dead_code)]

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use pullman::{
    Config, Credentials, DownloadState, PullRequestCoordinates, PullRequestDownload,
    PullRequestDownloader, RepositoryName,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Outcome of waiting for a download
#[derive(Debug, PartialEq, Eq)]
pub enum WaitResult {
    /// The key reached FINISHED
    Finished,
    /// The key reached ERROR
    Failed,
    /// The subscriber channel closed first
    ChannelClosed,
    /// Nothing happened within the timeout
    Timeout,
}

/// A changed file served by the mock provider
pub struct ServedFile {
    pub filename: &'static str,
    pub sha: &'static str,
    pub content: &'static [u8],
}

pub fn hello_world(number: u64) -> PullRequestCoordinates {
    PullRequestCoordinates::new(
        RepositoryName::parse("octocat/Hello-World").unwrap(),
        number,
    )
}

/// Mount the pull request detail, one page of changed files and the raw bodies.
pub async fn mount_pull_request(
    server: &MockServer,
    number: u64,
    head_sha: &str,
    files: &[ServedFile],
) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/octocat/Hello-World/pulls/{number}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": number,
            "number": number,
            "title": "Amazing new feature",
            "state": "open",
            "head": { "label": "octocat:new-topic", "ref": "new-topic", "sha": head_sha },
            "base": { "label": "octocat:master", "ref": "master", "sha": "base" }
        })))
        .mount(server)
        .await;

    let listed: Vec<serde_json::Value> = files
        .iter()
        .map(|f| {
            json!({
                "sha": f.sha,
                "filename": f.filename,
                "status": "added",
                "raw_url": format!("{}/raw/{}/{}", server.uri(), head_sha, f.filename),
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path(format!(
            "/repos/octocat/Hello-World/pulls/{number}/files"
        )))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listed))
        .mount(server)
        .await;

    for f in files {
        Mock::given(method("GET"))
            .and(path(format!("/raw/{}/{}", head_sha, f.filename)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(f.content.to_vec()))
            .mount(server)
            .await;
    }
}

/// Downloader talking to `server`, storing below a fresh temp directory.
pub fn create_downloader(server: &MockServer) -> (PullRequestDownloader, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.github.base_url = server.uri();
    config.download.location = temp_dir.path().join("pullman");
    let downloader =
        PullRequestDownloader::with_github(config, Credentials::new("octocat", "ghp_test"))
            .unwrap();
    (downloader, temp_dir)
}

/// Wait on state-change events until `key` reaches a terminal state.
pub async fn wait_for_terminal(
    downloader: &PullRequestDownloader,
    key: &PullRequestDownload,
    timeout: Duration,
) -> WaitResult {
    let mut events = downloader.subscribe().await;

    let result = tokio::time::timeout(timeout, async {
        loop {
            match downloader.state(key).await {
                Some(DownloadState::Finished) => return WaitResult::Finished,
                Some(DownloadState::Error) => return WaitResult::Failed,
                _ => {}
            }
            if events.recv().await.is_none() {
                return WaitResult::ChannelClosed;
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Entries of a zip archive as (name, content), sorted by name
pub fn zip_entries(archive: &Path) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(archive).unwrap()).unwrap();
    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.push((entry.name().to_string(), content));
    }
    entries.sort();
    entries
}
