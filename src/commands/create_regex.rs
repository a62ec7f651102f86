use std::time::Duration;

use tracing::warn;

use super::report;
use crate::App;
use crate::mutation::RegexMutation;
use crate::provider::GitProvider;
use crate::provider::PullRequestSpec;
use crate::repo::BranchScheme;
use crate::repo::RepositoryReference;

/// Seconds between merge status polls.
const MERGE_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Options of `pr create-regex`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CreateRegexArgs {
    /// Pattern locating the version. A group named `version` is replaced if
    /// present, else the first group, else the whole match
    #[arg(long)]
    pub regex: String,
    /// Version to write
    #[arg(long)]
    pub version: String,
    /// Glob of files to change, relative to the repository root
    #[arg(long = "files", required = true, num_args = 1..)]
    pub files: Vec<String>,
    /// Git URL of the repository to change; defaults to the current
    /// directory's origin
    #[arg(long)]
    pub repo: Option<String>,
    /// Git URL of the repository the version comes from, linked in the body
    #[arg(long = "src-repo")]
    pub src_repo: Option<String>,
    /// Target branch; defaults to the remote's default branch
    #[arg(long)]
    pub base: Option<String>,
    /// Label to add to the pull request
    #[arg(long = "label")]
    pub labels: Vec<String>,
    /// Names the kind of change in the branch name
    #[arg(long, default_value = "regex")]
    pub kind: String,
    /// Wait up to this many seconds for the pull request to be merged
    #[arg(long = "wait-merge", value_name = "SECS")]
    pub wait_merge: Option<u64>,
}

impl<P: GitProvider> App<P> {
    /// Update a version in the files matched by `--files` and propose it as
    /// a pull request.
    pub async fn cmd_create_regex(
        &self,
        args: &CreateRegexArgs,
        stdout: &mut impl std::io::Write,
    ) -> anyhow::Result<()> {
        let mutation = RegexMutation::new(&args.version, &args.regex, args.files.clone())?;

        let subject = match &args.src_repo {
            Some(url) => RepositoryReference::parse(url)?.name,
            None => {
                warn!("--src-repo not given; the pull request will not be linked in release notes");
                self.repo.name.clone()
            }
        };
        let branch = BranchScheme::new(format!("bump-{}", args.kind))
            .branch_name(&subject, &args.version);
        let spec = PullRequestSpec {
            base: args.base.clone().unwrap_or_default(),
            source_repo: args.src_repo.clone(),
            labels: args.labels.clone(),
            ..PullRequestSpec::new(
                format!("chore(deps): bump {} to {}", subject, args.version),
                format!("Update {} to version {}", subject, args.version),
            )
        };

        let orchestrator = self.orchestrator();
        let handle = orchestrator
            .execute(&self.repo, &branch, &mutation, &spec)
            .await?;
        report(handle.as_ref(), stdout)?;

        if let (Some(handle), Some(secs)) = (&handle, args.wait_merge) {
            let state = orchestrator
                .await_merge(
                    &self.repo,
                    handle,
                    Duration::from_secs(secs),
                    MERGE_POLL_INTERVAL,
                )
                .await?;
            writeln!(stdout, "Merge state: {:?}", state)?;
        }
        Ok(())
    }
}
