use crate::App;
use crate::labels::assignment;
use crate::labels::extract_labels;
use crate::labels::resolve_pull_request_id;
use crate::provider::GitProvider;

/// Options of `pr labels`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct LabelsArgs {
    /// Pull request number; defaults to the `PR-<n>` in $BRANCH_NAME
    #[arg(long)]
    pub pr: Option<String>,
    /// Prefix of the emitted variable names. Defaults to $GITOPS_PR_LABEL_PREFIX,
    /// else PR_LABELS; pass JX_PR_LABELS for the names Jenkins X pipelines expect
    #[arg(long)]
    pub prefix: Option<String>,
    /// Git URL of the repository; defaults to the current directory's origin
    #[arg(long, alias = "repo")]
    pub url: Option<String>,
}

impl<P: GitProvider> App<P> {
    /// Print one `<PREFIX>_<LABEL>='<label>'` line per label of a pull
    /// request. Lines are flushed as they are written.
    pub async fn cmd_labels(
        &self,
        args: &LabelsArgs,
        stdout: &mut impl std::io::Write,
    ) -> anyhow::Result<()> {
        let id = resolve_pull_request_id(args.pr.as_deref(), self.config.branch_name.as_deref())?;
        let prefix = args.prefix.as_deref().unwrap_or(&self.config.label_prefix);

        let pr = self.provider.get_pull_request(&self.repo, &id).await?;
        let labels = self.provider.list_labels(&self.repo, &pr).await?;
        for (key, value) in extract_labels(prefix, &labels) {
            writeln!(stdout, "{}", assignment(&key, &value))?;
            stdout.flush()?;
        }
        Ok(())
    }
}
