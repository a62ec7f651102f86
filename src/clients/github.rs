use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;
use tracing::warn;

use super::http::CurlClient;
use crate::config::HttpSettings;
use crate::error::ApiError;
use crate::error::Error;
use crate::error::Result;
use crate::provider::GitProvider;
use crate::provider::Label;
use crate::provider::MergeState;
use crate::provider::PullRequest;
use crate::provider::PullRequestHandle;
use crate::provider::PullRequestId;
use crate::provider::PullRequestSpec;
use crate::repo::RepositoryReference;

// -----------------------------------------------------------------------------
// Types

/// Client to interact with the GitHub REST API.
pub struct GithubClient {
    api_url: String,
    http_client: CurlClient,
}

#[derive(Debug, Deserialize)]
struct GithubPullRequest {
    number: u64,
    html_url: String,
    state: String,
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    merged_at: Option<String>,
    title: String,
    head: GithubRef,
    base: GithubRef,
    #[serde(default)]
    labels: Vec<GithubLabel>,
}

#[derive(Debug, Deserialize)]
struct GithubRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct GithubLabel {
    name: String,
}

#[derive(Debug, Serialize)]
struct CreatePullRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdatePullRequest<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct AddLabels<'a> {
    labels: &'a [String],
}

impl From<GithubPullRequest> for PullRequest {
    fn from(pr: GithubPullRequest) -> Self {
        let state = if pr.merged || pr.merged_at.is_some() {
            MergeState::Merged
        } else if pr.state == "open" {
            MergeState::Open
        } else {
            MergeState::Closed
        };
        Self {
            number: pr.number,
            url: pr.html_url,
            state,
            title: pr.title,
            head: pr.head.ref_name,
            base: pr.base.ref_name,
            labels: pr
                .labels
                .into_iter()
                .map(|l| Label { name: l.name })
                .collect(),
        }
    }
}

// -----------------------------------------------------------------------------
// GithubClient impl

impl GithubClient {
    pub fn new(api_url: String, token: Option<String>, settings: HttpSettings) -> Self {
        let mut headers = vec!["X-GitHub-Api-Version: 2022-11-28".to_string()];
        match token {
            Some(token) => headers.push(format!("Authorization: Bearer {}", token)),
            None => warn!("GITHUB_TOKEN is not set; GitHub requests are unauthenticated"),
        }
        Self {
            api_url,
            http_client: CurlClient::new(headers, settings),
        }
    }

    fn repo_url(&self, repo: &RepositoryReference) -> String {
        format!(
            "{}/repos/{}/{}",
            self.api_url, repo.organisation, repo.name
        )
    }

    async fn add_labels(
        &self,
        repo: &RepositoryReference,
        number: u64,
        labels: &[String],
    ) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let url = format!("{}/issues/{}/labels", self.repo_url(repo), number);
        let json_data = to_json(&AddLabels { labels })?;
        self.http_client
            .post(&url, &json_data)
            .await
            .map_err(api_error("add labels", format!("{}#{}", repo.full_name(), number)))?;
        Ok(())
    }
}

impl GitProvider for GithubClient {
    #[instrument(skip_all, fields(repo = %repo.full_name(), pr = %id))]
    async fn get_pull_request(
        &self,
        repo: &RepositoryReference,
        id: &PullRequestId,
    ) -> Result<PullRequest> {
        let target = format!("{}#{}", repo.full_name(), id);
        let url = format!("{}/pulls/{}", self.repo_url(repo), id.raw);
        let response = self
            .http_client
            .get(&url)
            .await
            .map_err(api_error("get pull request", target.clone()))?;
        let pr: GithubPullRequest = from_json(&response, "get pull request", &target)?;
        Ok(pr.into())
    }

    #[instrument(skip_all, fields(repo = %repo.full_name(), pr = pr.number))]
    async fn list_labels(
        &self,
        repo: &RepositoryReference,
        pr: &PullRequest,
    ) -> Result<Vec<Label>> {
        let target = format!("{}#{}", repo.full_name(), pr.number);
        let url = format!(
            "{}/issues/{}/labels?per_page=100",
            self.repo_url(repo),
            pr.number
        );
        let response = self
            .http_client
            .get(&url)
            .await
            .map_err(api_error("list labels", target.clone()))?;
        let labels: Vec<GithubLabel> = from_json(&response, "list labels", &target)?;
        Ok(labels.into_iter().map(|l| Label { name: l.name }).collect())
    }

    #[instrument(skip_all, fields(repo = %repo.full_name(), head = head))]
    async fn find_open_pull_request(
        &self,
        repo: &RepositoryReference,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestHandle>> {
        let target = format!("{}:{}", repo.full_name(), head);
        let url = format!(
            "{}/pulls?head={}:{}&base={}&state=open",
            self.repo_url(repo),
            repo.organisation,
            head,
            base
        );
        let response = self
            .http_client
            .get(&url)
            .await
            .map_err(api_error("find pull request", target.clone()))?;
        let prs: Vec<GithubPullRequest> = from_json(&response, "find pull request", &target)?;
        Ok(prs
            .into_iter()
            .next()
            .map(|pr| PullRequestHandle::from(&PullRequest::from(pr))))
    }

    #[instrument(skip_all, fields(repo = %repo.full_name(), head = %spec.branch))]
    async fn create_pull_request(
        &self,
        repo: &RepositoryReference,
        spec: &PullRequestSpec,
    ) -> Result<PullRequestHandle> {
        let target = format!("{}:{}", repo.full_name(), spec.branch);
        let url = format!("{}/pulls", self.repo_url(repo));
        let body = spec.rendered_body();
        let json_data = to_json(&CreatePullRequest {
            title: &spec.title,
            body: &body,
            head: &spec.branch,
            base: &spec.base,
        })?;
        let response = self
            .http_client
            .post(&url, &json_data)
            .await
            .map_err(api_error("create pull request", target.clone()))?;
        let pr: GithubPullRequest = from_json(&response, "create pull request", &target)?;
        let pr = PullRequest::from(pr);
        self.add_labels(repo, pr.number, &spec.labels).await?;
        Ok(PullRequestHandle::from(&pr))
    }

    #[instrument(skip_all, fields(repo = %repo.full_name(), pr = handle.number))]
    async fn update_pull_request(
        &self,
        repo: &RepositoryReference,
        handle: &PullRequestHandle,
        spec: &PullRequestSpec,
    ) -> Result<PullRequestHandle> {
        let target = format!("{}#{}", repo.full_name(), handle.number);
        let url = format!("{}/pulls/{}", self.repo_url(repo), handle.number);
        let body = spec.rendered_body();
        let json_data = to_json(&UpdatePullRequest {
            title: &spec.title,
            body: &body,
        })?;
        let response = self
            .http_client
            .patch(&url, &json_data)
            .await
            .map_err(api_error("update pull request", target.clone()))?;
        let pr: GithubPullRequest = from_json(&response, "update pull request", &target)?;
        let pr = PullRequest::from(pr);
        self.add_labels(repo, pr.number, &spec.labels).await?;
        Ok(PullRequestHandle::from(&pr))
    }
}

fn api_error(op: &'static str, target: String) -> impl FnOnce(ApiError) -> Error {
    move |source| Error::ProviderApi { op, target, source }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::ProviderApi {
        op: "encode request",
        target: std::any::type_name::<T>().to_string(),
        source: ApiError::definitive(None, e.to_string()),
    })
}

fn from_json<T: DeserializeOwned>(response: &str, op: &'static str, target: &str) -> Result<T> {
    serde_json::from_str(response).map_err(|e| Error::ProviderApi {
        op,
        target: target.to_string(),
        source: ApiError::definitive(None, format!("unexpected response: {e}")),
    })
}
