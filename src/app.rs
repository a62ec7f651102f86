use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::orchestrator::PullRequestOrchestrator;
use crate::provider::GitProvider;
use crate::provider::Provider;
use crate::repo::RepositoryReference;

pub struct App<P = Provider> {
    pub config: Config,
    pub provider: P,
    /// Repository the commands act on.
    pub repo: RepositoryReference,
    pub cancel: CancellationToken,
}

impl<P: GitProvider> App<P> {
    pub fn new(config: Config, provider: P, repo: RepositoryReference) -> Self {
        Self {
            config,
            provider,
            repo,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn orchestrator(&self) -> PullRequestOrchestrator<'_, P> {
        PullRequestOrchestrator::new(&self.provider, self.cancel.clone())
    }
}
