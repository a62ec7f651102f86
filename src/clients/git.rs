use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;
use std::process::Output;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use tokio::process::Command;
use tracing::debug;
use tracing::instrument;

// -----------------------------------------------------------------------------
// Types

/// Git client bound to one working copy.
pub struct GitClient {
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitId(pub String);

impl Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// -----------------------------------------------------------------------------
// GitClient impl

impl GitClient {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone `url` into `dest` and return a client for the new working copy.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn clone(url: &str, dest: &Path) -> Result<Self> {
        let output = Command::new("git")
            .arg("clone")
            .arg("--quiet")
            .arg(url)
            .arg(dest)
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute git command")?;
        check(&output)?;
        Ok(Self::new(dest.to_path_buf()))
    }

    pub async fn remote_url(&self) -> Result<String> {
        self.run(&["config", "--get", "remote.origin.url"]).await
    }

    /// The branch `origin/HEAD` points at, e.g. `main`.
    pub async fn default_branch(&self) -> Result<String> {
        let head = self
            .run(&["symbolic-ref", "--short", "refs/remotes/origin/HEAD"])
            .await?;
        Ok(head.strip_prefix("origin/").unwrap_or(&head).to_string())
    }

    pub async fn remote_branch_exists(&self, branch: &str) -> Result<bool> {
        let output = self
            .command(&["ls-remote", "--exit-code", "--heads", "origin", branch])
            .output()
            .await
            .context("Failed to execute git command")?;

        // Exit code 2 means no matching refs
        match output.status.code() {
            Some(0) => Ok(true),
            Some(2) => Ok(false),
            _ => bail!(
                "git command failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ),
        }
    }

    pub async fn fetch_branch(&self, branch: &str) -> Result<()> {
        let refspec = format!("refs/heads/{branch}:refs/remotes/origin/{branch}");
        self.run(&["fetch", "--quiet", "origin", &refspec]).await?;
        Ok(())
    }

    /// Point `branch` at `start` and check it out, creating it if needed.
    pub async fn checkout_branch(&self, branch: &str, start: &str) -> Result<()> {
        self.run(&["checkout", "--quiet", "-B", branch, start])
            .await?;
        Ok(())
    }

    pub async fn head(&self) -> Result<CommitId> {
        Ok(CommitId(self.run(&["rev-parse", "HEAD"]).await?))
    }

    /// Whether the trees of `base` and `head` differ.
    pub async fn trees_differ(&self, base: &str, head: &str) -> Result<bool> {
        let output = self
            .command(&["diff", "--quiet", base, head])
            .output()
            .await
            .context("Failed to execute git command")?;

        // Exit code 1 means the trees differ
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => bail!(
                "git command failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        }
    }

    /// Paths with uncommitted changes, relative to the working copy root.
    pub async fn changed_files(&self) -> Result<Vec<PathBuf>> {
        let output = self
            .command(&["status", "--porcelain", "--untracked-files=all"])
            .output()
            .await
            .context("Failed to execute git command")?;
        check(&output)?;

        let status = String::from_utf8(output.stdout)?;
        Ok(status
            .lines()
            .filter(|line| line.len() > 3)
            .map(|line| {
                // Renames are reported as "old -> new"
                let path = &line[3..];
                let path = path.rsplit(" -> ").next().unwrap_or(path);
                PathBuf::from(path.trim_matches('"'))
            })
            .collect())
    }

    pub async fn add_all(&self) -> Result<()> {
        self.run(&["add", "--all"]).await?;
        Ok(())
    }

    /// Commit the index. Falls back to a bot identity when none is configured.
    pub async fn commit(&self, message: &str) -> Result<CommitId> {
        let mut args = vec![];
        if self.run(&["config", "user.email"]).await.is_err() {
            args.extend([
                "-c",
                "user.name=gitops-pr",
                "-c",
                "user.email=gitops-pr@localhost",
            ]);
        }
        args.extend(["commit", "--quiet", "-m", message]);
        self.run(&args).await?;
        self.head().await
    }

    pub async fn push_branch(&self, branch: &str) -> Result<()> {
        let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);
        self.run(&["push", "--quiet", "-u", "origin", &refspec])
            .await?;
        Ok(())
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new("git");
        command
            .current_dir(&self.path)
            .args(args)
            .kill_on_drop(true);
        command
    }

    /// Run a git command and return its trimmed stdout.
    async fn run(&self, args: &[&str]) -> Result<String> {
        debug!("git {}", args.join(" "));
        let output = self
            .command(args)
            .output()
            .await
            .context("Failed to execute git command")?;
        check(&output)?;
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }
}

fn check(output: &Output) -> Result<()> {
    if !output.status.success() {
        bail!(
            "git command failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
