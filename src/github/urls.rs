//! URL construction for GitHub REST endpoints.

use crate::error::{Error, Result};
use crate::types::{PullRequestCoordinates, RepositoryName};
use url::Url;

use super::models::PullRequestState;

/// Builds endpoint URLs relative to a configured API base URL
#[derive(Clone, Debug)]
pub struct GitHubUrls {
    base: Url,
}

impl GitHubUrls {
    /// Parse the base URL; a malformed value is an [`Error::Init`].
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| Error::Init(format!("unable to parse base URL {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Init(format!("base URL {} cannot be a base", base_url)));
        }
        // Url::join replaces the last segment unless the path ends with '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    /// `GET /user`
    pub fn current_user(&self) -> Url {
        self.endpoint(&["user"])
    }

    /// `GET /user/repos`
    pub fn user_repos(&self) -> Url {
        self.endpoint(&["user", "repos"])
    }

    /// `GET /repos/{owner}/{repo}/pulls?page=..&state=..`
    pub fn pull_requests(
        &self,
        repository: &RepositoryName,
        page: u32,
        state: PullRequestState,
    ) -> Url {
        let mut url = self.endpoint(&["repos", repository.owner(), repository.repo(), "pulls"]);
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("state", state.as_str());
        url
    }

    /// `GET /repos/{owner}/{repo}/pulls/{number}`
    pub fn pull_request_detail(&self, coordinates: &PullRequestCoordinates) -> Url {
        let number = coordinates.number.to_string();
        self.endpoint(&[
            "repos",
            coordinates.repository_name.owner(),
            coordinates.repository_name.repo(),
            "pulls",
            &number,
        ])
    }

    /// `PUT /repos/{owner}/{repo}/pulls/{number}/merge`
    pub fn pull_request_merge(&self, coordinates: &PullRequestCoordinates) -> Url {
        let mut url = self.pull_request_detail(coordinates);
        if let Ok(mut path) = url.path_segments_mut() {
            path.push("merge");
        }
        url
    }

    /// `GET /repos/{owner}/{repo}/collaborators/{username}/permission`
    pub fn collaborator_permission(&self, repository: &RepositoryName, username: &str) -> Url {
        self.endpoint(&[
            "repos",
            repository.owner(),
            repository.repo(),
            "collaborators",
            username,
            "permission",
        ])
    }

    /// `GET /repos/{owner}/{repo}/pulls/{number}/files?page=..`
    pub fn pull_request_files(&self, coordinates: &PullRequestCoordinates, page: u32) -> Url {
        let number = coordinates.number.to_string();
        let mut url = self.endpoint(&[
            "repos",
            coordinates.repository_name.owner(),
            coordinates.repository_name.repo(),
            "pulls",
            &number,
            "files",
        ]);
        url.query_pairs_mut().append_pair("page", &page.to_string());
        url
    }

    /// `GET /repos/{owner}/{repo}/zipball/{ref}`
    pub fn zipball(&self, repository: &RepositoryName, revision: &str) -> Url {
        self.endpoint(&["repos", repository.owner(), repository.repo(), "zipball", revision])
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}
