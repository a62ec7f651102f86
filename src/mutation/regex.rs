use std::path::Path;

use regex::Captures;
use regex::Regex;
use tracing::info;
use tracing::warn;

use super::Mutation;
use super::MutationOutcome;
use super::resolve_globs;
use super::write_if_changed;
use crate::error::Error;
use crate::error::Result;

/// Name of the capture group that receives the version, when present.
pub const VERSION_GROUP: &str = "version";

/// Replaces a version in files matched by globs.
///
/// Per match, the replaced span is the `version` named group if the pattern
/// has one, else the first capture group, else the whole match.
#[derive(Debug, Clone)]
pub struct RegexMutation {
    version: String,
    regex: Regex,
    globs: Vec<String>,
}

impl RegexMutation {
    /// Compile `pattern`, forcing multi-line mode unless it already starts with
    /// a `(?m` flag group.
    pub fn new(version: impl Into<String>, pattern: &str, globs: Vec<String>) -> Result<Self> {
        let pattern = if pattern.starts_with("(?m") {
            pattern.to_string()
        } else {
            format!("(?m){pattern}")
        };
        let regex = Regex::new(&pattern).map_err(|source| Error::RegexCompile {
            pattern: pattern.clone(),
            source,
        })?;
        Ok(Self {
            version: version.into(),
            regex,
            globs,
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Substitute the version into `content`.
    ///
    /// Returns `None` when the pattern does not match at all; a match that
    /// already holds the version returns the content unchanged.
    pub fn replace<'a>(&self, content: &'a str) -> Option<String> {
        let has_named_version = self
            .regex
            .capture_names()
            .any(|name| name == Some(VERSION_GROUP));
        let has_groups = self.regex.captures_len() > 1;
        let target = |caps: &Captures<'a>| -> Option<regex::Match<'a>> {
            if has_named_version {
                caps.name(VERSION_GROUP)
            } else if has_groups {
                caps.get(1)
            } else {
                caps.get(0)
            }
        };

        let mut matched = false;
        let mut result = String::with_capacity(content.len());
        let mut last = 0;
        for caps in self.regex.captures_iter(content) {
            matched = true;
            // An optional group that did not participate leaves the match as is
            let Some(span) = target(&caps) else {
                continue;
            };
            result.push_str(&content[last..span.start()]);
            result.push_str(&self.version);
            last = span.end();
        }
        if !matched {
            return None;
        }
        result.push_str(&content[last..]);
        Some(result)
    }
}

impl Mutation for RegexMutation {
    async fn apply(&self, dir: &Path) -> Result<MutationOutcome> {
        let files = resolve_globs(dir, &self.globs)?;
        let mut outcome = MutationOutcome::default();
        let mut matched_any = false;

        for path in files {
            let content = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| Error::MutationIo {
                    op: "read",
                    path: path.clone(),
                    source,
                })?;
            let Some(updated) = self.replace(&content) else {
                warn!(
                    "regex {} did not match {}",
                    self.pattern(),
                    path.strip_prefix(dir).unwrap_or(&path).display()
                );
                continue;
            };
            matched_any = true;
            if write_if_changed(&path, &updated).await? {
                info!("Updated {}", path.strip_prefix(dir).unwrap_or(&path).display());
                outcome.record(dir, &path);
            }
        }

        if !matched_any {
            return Err(Error::NoMatch {
                pattern: self.pattern().to_string(),
                globs: self.globs.clone(),
            });
        }
        Ok(outcome)
    }
}
