use std::path::Path;
use std::path::PathBuf;

use tempfile::TempDir;
use tracing::debug;
use tracing::info;

use crate::clients::git::CommitId;
use crate::clients::git::GitClient;
use crate::error::Error;
use crate::error::Result;
use crate::repo::RepositoryReference;

/// A temporary working copy of one repository.
///
/// The clone lives in its own temporary directory, removed when the workspace
/// is dropped, whichever way the run ends.
pub struct RepositoryWorkspace {
    repo: RepositoryReference,
    git: GitClient,
    branch: Option<String>,
    // Dropped last
    _dir: TempDir,
}

/// How the working branch was set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCheckout {
    /// Fresh branch started from the base branch.
    Created,
    /// Branch already existed on the remote and was checked out.
    Resumed,
}

impl RepositoryWorkspace {
    pub async fn clone(repo: &RepositoryReference) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("gitops-pr-")
            .tempdir()
            .map_err(|e| workspace_error("clone", repo, "", e))?;
        let path = dir.path().join(&repo.name);
        info!("Cloning {} into {}", repo.clone_url, path.display());
        let git = GitClient::clone(&repo.clone_url, &path)
            .await
            .map_err(|e| workspace_error("clone", repo, "", e))?;
        Ok(Self {
            repo: repo.clone(),
            git,
            branch: None,
            _dir: dir,
        })
    }

    pub fn path(&self) -> &Path {
        self.git.path()
    }

    pub async fn default_branch(&self) -> Result<String> {
        self.git
            .default_branch()
            .await
            .map_err(|e| self.error("resolve default branch", e))
    }

    /// Check out `branch`, resuming it from the remote when it already exists
    /// there and starting it from `base` otherwise.
    pub async fn checkout(&mut self, branch: &str, base: &str) -> Result<BranchCheckout> {
        self.branch = Some(branch.to_string());
        let exists = self
            .git
            .remote_branch_exists(branch)
            .await
            .map_err(|e| self.error("ls-remote", e))?;

        let (start, checkout) = if exists {
            self.git
                .fetch_branch(branch)
                .await
                .map_err(|e| self.error("fetch", e))?;
            (format!("origin/{branch}"), BranchCheckout::Resumed)
        } else {
            (format!("origin/{base}"), BranchCheckout::Created)
        };
        debug!("Checking out {} from {}", branch, start);
        self.git
            .checkout_branch(branch, &start)
            .await
            .map_err(|e| self.error("checkout", e))?;
        Ok(checkout)
    }

    /// Whether the working branch's tree holds changes `base` does not.
    ///
    /// Compares content, not history: a branch whose commits landed on `base`
    /// through a squash merge does not differ.
    pub async fn differs_from(&self, base: &str) -> Result<bool> {
        self.git
            .trees_differ(&format!("origin/{base}"), "HEAD")
            .await
            .map_err(|e| self.error("diff", e))
    }

    pub async fn changed_files(&self) -> Result<Vec<PathBuf>> {
        self.git
            .changed_files()
            .await
            .map_err(|e| self.error("status", e))
    }

    /// Stage everything and commit it.
    pub async fn commit_all(&self, message: &str) -> Result<CommitId> {
        self.git
            .add_all()
            .await
            .map_err(|e| self.error("add", e))?;
        self.git
            .commit(message)
            .await
            .map_err(|e| self.error("commit", e))
    }

    pub async fn push(&self) -> Result<()> {
        let branch = self.branch.as_deref().unwrap_or_default();
        self.git
            .push_branch(branch)
            .await
            .map_err(|e| self.error("push", e))
    }

    fn error(&self, op: &'static str, err: impl std::fmt::Display) -> Error {
        workspace_error(op, &self.repo, self.branch.as_deref().unwrap_or_default(), err)
    }
}

fn workspace_error(
    op: &'static str,
    repo: &RepositoryReference,
    branch: &str,
    err: impl std::fmt::Display,
) -> Error {
    Error::Workspace {
        op,
        repo: repo.full_name(),
        branch: branch.to_string(),
        message: format!("{err:#}"),
    }
}
