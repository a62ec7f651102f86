//! Git hosting backends.
//!
//! [`GitProvider`] is the capability set the orchestrator and label extraction
//! need from a hosting product. [`Provider`] is resolved once from the
//! repository's host; callers never branch on the backend afterwards.

#![allow(async_fn_in_trait)]

use std::fmt::Display;

use tracing::warn;

use crate::clients::github::GithubClient;
use crate::config::Config;
use crate::config::DEFAULT_GITHUB_API_URL;
use crate::error::Error;
use crate::error::Result;
use crate::repo::RepositoryReference;

// -----------------------------------------------------------------------------
// Types

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Open,
    Merged,
    Closed,
}

/// A pull request as fetched from a provider.
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub state: MergeState,
    pub title: String,
    /// Source branch.
    pub head: String,
    /// Target branch.
    pub base: String,
    pub labels: Vec<Label>,
}

/// The terminal artifact of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestHandle {
    pub number: u64,
    pub url: String,
    pub merge_state: MergeState,
}

impl From<&PullRequest> for PullRequestHandle {
    fn from(pr: &PullRequest) -> Self {
        Self {
            number: pr.number,
            url: pr.url.clone(),
            merge_state: pr.state,
        }
    }
}

/// What to open (or update) once the branch is pushed.
#[derive(Debug, Clone, Default)]
pub struct PullRequestSpec {
    pub branch: String,
    pub base: String,
    pub title: String,
    pub body: String,
    /// Repository the change originates from; linked in the body.
    pub source_repo: Option<String>,
    pub labels: Vec<String>,
}

impl PullRequestSpec {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    /// Body as sent to the provider, with the source repository appended.
    pub fn rendered_body(&self) -> String {
        match &self.source_repo {
            Some(src) => format!("{}\n\nSource: {}", self.body, src),
            None => self.body.clone(),
        }
    }
}

/// A pull request identifier as given by the user.
///
/// Providers that key pull requests by number use [`Self::number`]; the raw
/// form is kept for providers that accept other identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestId {
    pub raw: String,
    pub number: Option<u64>,
}

impl PullRequestId {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().strip_prefix("PR-").unwrap_or(raw.trim());
        let number = raw.parse().ok();
        if number.is_none() {
            warn!("Unable to convert PR {} to a number", raw);
        }
        Self {
            raw: raw.to_string(),
            number,
        }
    }
}

impl Display for PullRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

// -----------------------------------------------------------------------------
// GitProvider trait

/// Operations the engine needs from a git hosting backend.
pub trait GitProvider {
    async fn get_pull_request(
        &self,
        repo: &RepositoryReference,
        id: &PullRequestId,
    ) -> Result<PullRequest>;

    async fn list_labels(&self, repo: &RepositoryReference, pr: &PullRequest)
    -> Result<Vec<Label>>;

    /// The open pull request from `head` into `base`, if there is one.
    async fn find_open_pull_request(
        &self,
        repo: &RepositoryReference,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestHandle>>;

    async fn create_pull_request(
        &self,
        repo: &RepositoryReference,
        spec: &PullRequestSpec,
    ) -> Result<PullRequestHandle>;

    async fn update_pull_request(
        &self,
        repo: &RepositoryReference,
        handle: &PullRequestHandle,
        spec: &PullRequestSpec,
    ) -> Result<PullRequestHandle>;
}

// -----------------------------------------------------------------------------
// Provider

/// The backend serving a repository.
pub enum Provider {
    Github(GithubClient),
}

impl Provider {
    /// Pick the backend for `repo` from its host.
    pub fn resolve(repo: &RepositoryReference, config: &Config) -> Result<Self> {
        if repo.host == "github.com" {
            return Ok(Self::Github(GithubClient::new(
                config.github_api_url.clone(),
                config.github_token.clone(),
                config.http.clone(),
            )));
        }
        if config.github_hosts.iter().any(|h| h == &repo.host) {
            let api_url = if config.github_api_url == DEFAULT_GITHUB_API_URL {
                format!("https://{}/api/v3", repo.host)
            } else {
                config.github_api_url.clone()
            };
            return Ok(Self::Github(GithubClient::new(
                api_url,
                config.github_token.clone(),
                config.http.clone(),
            )));
        }
        Err(Error::ProviderNotFound(repo.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Github(_) => "github",
        }
    }
}

impl GitProvider for Provider {
    async fn get_pull_request(
        &self,
        repo: &RepositoryReference,
        id: &PullRequestId,
    ) -> Result<PullRequest> {
        match self {
            Self::Github(gh) => gh.get_pull_request(repo, id).await,
        }
    }

    async fn list_labels(
        &self,
        repo: &RepositoryReference,
        pr: &PullRequest,
    ) -> Result<Vec<Label>> {
        match self {
            Self::Github(gh) => gh.list_labels(repo, pr).await,
        }
    }

    async fn find_open_pull_request(
        &self,
        repo: &RepositoryReference,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestHandle>> {
        match self {
            Self::Github(gh) => gh.find_open_pull_request(repo, head, base).await,
        }
    }

    async fn create_pull_request(
        &self,
        repo: &RepositoryReference,
        spec: &PullRequestSpec,
    ) -> Result<PullRequestHandle> {
        match self {
            Self::Github(gh) => gh.create_pull_request(repo, spec).await,
        }
    }

    async fn update_pull_request(
        &self,
        repo: &RepositoryReference,
        handle: &PullRequestHandle,
        spec: &PullRequestSpec,
    ) -> Result<PullRequestHandle> {
        match self {
            Self::Github(gh) => gh.update_pull_request(repo, handle, spec).await,
        }
    }
}
