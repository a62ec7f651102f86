//! Pull request labels as shell variable assignments.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;
use crate::error::Result;
use crate::provider::Label;
use crate::provider::PullRequestId;

static NON_ALPHANUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").unwrap());

/// Upper-case `name` with every run of non-alphanumerics turned into `_`.
pub fn normalize_label(name: &str) -> String {
    NON_ALPHANUMERIC_RE
        .replace_all(name, "_")
        .to_uppercase()
}

/// `(<prefix>_<NORMALIZED>, original name)` for each label, in order.
pub fn extract_labels(prefix: &str, labels: &[Label]) -> Vec<(String, String)> {
    labels
        .iter()
        .map(|label| {
            (
                format!("{}_{}", prefix, normalize_label(&label.name)),
                label.name.clone(),
            )
        })
        .collect()
}

/// Render one `KEY='value'` line, safe to `eval` in a POSIX shell.
pub fn assignment(key: &str, value: &str) -> String {
    format!("{}='{}'", key, value.replace('\'', r"'\''"))
}

/// The pull request to read labels from.
///
/// An explicit `--pr` wins; otherwise a `PR-<n>` branch name from the
/// environment is used.
pub fn resolve_pull_request_id(
    flag: Option<&str>,
    branch_name: Option<&str>,
) -> Result<PullRequestId> {
    let present = |id: &&str| !id.trim().is_empty();
    flag.filter(present)
        .or(branch_name.filter(present))
        .map(PullRequestId::parse)
        .ok_or_else(|| Error::MissingOption("pr".to_string()))
}
