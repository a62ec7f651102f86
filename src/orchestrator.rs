//! Drives one change from a fresh clone to an open pull request.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::mutation::Mutation;
use crate::provider::GitProvider;
use crate::provider::MergeState;
use crate::provider::PullRequestHandle;
use crate::provider::PullRequestId;
use crate::provider::PullRequestSpec;
use crate::repo::RepositoryReference;
use crate::workspace::BranchCheckout;
use crate::workspace::RepositoryWorkspace;

/// Sequences clone, mutation, commit, push and pull request upsert.
///
/// Steps run one after another. Cancellation is checked at every step
/// boundary; the working copy is removed on every exit path.
pub struct PullRequestOrchestrator<'a, P> {
    provider: &'a P,
    cancel: CancellationToken,
}

impl<'a, P: GitProvider> PullRequestOrchestrator<'a, P> {
    pub fn new(provider: &'a P, cancel: CancellationToken) -> Self {
        Self { provider, cancel }
    }

    /// Apply `mutation` to `repo` on `branch` and open or update the pull
    /// request described by `template`.
    ///
    /// An empty `template.base` targets the repository's default branch.
    /// Returns `None` when there is nothing to propose: the mutation changed
    /// nothing and the branch holds no earlier unmerged commits.
    #[instrument(skip_all, fields(repo = %repo, branch = %branch))]
    pub async fn execute(
        &self,
        repo: &RepositoryReference,
        branch: &str,
        mutation: &impl Mutation,
        template: &PullRequestSpec,
    ) -> Result<Option<PullRequestHandle>> {
        let mut workspace = self.step("clone", RepositoryWorkspace::clone(repo)).await?;

        let base = if template.base.is_empty() {
            self.step("default branch", workspace.default_branch())
                .await?
        } else {
            template.base.clone()
        };
        let checkout = self
            .step("checkout", workspace.checkout(branch, &base))
            .await?;

        let outcome = self
            .step("mutation", mutation.apply(workspace.path()))
            .await?;
        let mut has_diff = outcome.has_diff();
        if has_diff && self.step("status", workspace.changed_files()).await?.is_empty() {
            warn!("Mutation wrote only files git ignores; nothing to commit");
            has_diff = false;
        }

        // A resumed branch may carry a change from an attempt whose pull
        // request was never opened. A stale branch whose content already
        // landed on base has nothing left to propose.
        let unproposed = checkout == BranchCheckout::Resumed
            && self.step("diff", workspace.differs_from(&base)).await?;
        if !has_diff && !unproposed {
            info!("No changes for {}", repo.full_name());
            return Ok(None);
        }

        if has_diff {
            for path in &outcome.changed_files {
                debug!("Changed {}", path.display());
            }
            let commit = self
                .step("commit", workspace.commit_all(&template.title))
                .await?;
            info!("Committed {} on {}", commit, branch);
            self.step("push", workspace.push()).await?;
            info!("Pushed {}", branch);
        }

        let spec = PullRequestSpec {
            branch: branch.to_string(),
            base: base.clone(),
            ..template.clone()
        };
        if spec.source_repo.is_none() {
            warn!("No source repository given; the pull request body will not link one");
        }

        let existing = self
            .step(
                "find pull request",
                self.provider.find_open_pull_request(repo, branch, &base),
            )
            .await?;
        let handle = match existing {
            Some(existing) => {
                let handle = self
                    .step(
                        "update pull request",
                        self.provider.update_pull_request(repo, &existing, &spec),
                    )
                    .await?;
                info!("Updated pull request {}", handle.url);
                handle
            }
            None => {
                let handle = self
                    .step(
                        "create pull request",
                        self.provider.create_pull_request(repo, &spec),
                    )
                    .await?;
                info!("Created pull request {}", handle.url);
                handle
            }
        };
        Ok(Some(handle))
    }

    /// Poll `handle` every `interval` until it is merged or closed.
    ///
    /// Transient provider errors are logged and polled through; definitive
    /// ones end the wait. Fails with [`Error::MergeTimeout`] once `timeout`
    /// has passed with the pull request still open.
    pub async fn await_merge(
        &self,
        repo: &RepositoryReference,
        handle: &PullRequestHandle,
        timeout: Duration,
        interval: Duration,
    ) -> Result<MergeState> {
        let id = PullRequestId {
            raw: handle.number.to_string(),
            number: Some(handle.number),
        };
        let start = Instant::now();
        info!("Waiting for {} to be merged", handle.url);
        loop {
            match self
                .step("merge status", self.provider.get_pull_request(repo, &id))
                .await
            {
                Ok(pr) if pr.state != MergeState::Open => {
                    info!("Pull request {} is {:?}", handle.url, pr.state);
                    return Ok(pr.state);
                }
                Ok(_) => debug!("Pull request {} still open", handle.url),
                Err(e) if e.is_transient() => warn!("Polling {} failed: {}", handle.url, e),
                Err(e) => return Err(e),
            }
            // No deadline instant: `timeout` may be close to Duration::MAX
            if start.elapsed().saturating_add(interval) > timeout {
                return Err(Error::MergeTimeout {
                    url: handle.url.clone(),
                    timeout,
                });
            }
            self.step("merge status", async {
                tokio::time::sleep(interval).await;
                Ok(())
            })
            .await?;
        }
    }

    async fn step<T>(
        &self,
        step: &'static str,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled { step }),
            result = future => result,
        }
    }
}
