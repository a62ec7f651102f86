use std::fmt::Display;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::clients::git::GitClient;
use crate::error::Error;
use crate::error::Result;

static BRANCH_UNSAFE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

// -----------------------------------------------------------------------------
// RepositoryReference

/// A resolved git repository on some hosting backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryReference {
    pub host: String,
    pub organisation: String,
    pub name: String,
    pub clone_url: String,
}

impl RepositoryReference {
    /// Parse a clone URL.
    ///
    /// Accepts `https://host/org/repo(.git)`, `ssh://git@host[:port]/org/repo`,
    /// scp-like `git@host:org/repo.git`, `file://` URLs and bare local paths.
    /// Nested groups (`host/group/sub/repo`) keep everything but the last
    /// segment as the organisation.
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidOption {
            option: "repo".to_string(),
            value: url.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = url.trim();

        let (host, path) = if let Some(rest) = trimmed.strip_prefix("file://") {
            ("localhost".to_string(), rest)
        } else if trimmed.starts_with('/') {
            ("localhost".to_string(), trimmed)
        } else if let Some((_, rest)) = trimmed.split_once("://") {
            let (authority, path) = rest
                .split_once('/')
                .ok_or_else(|| invalid("no repository path"))?;
            let host = authority.rsplit('@').next().unwrap_or(authority);
            let host = host.split(':').next().unwrap_or(host);
            (host.to_string(), path)
        } else if let Some((authority, path)) = trimmed.split_once(':') {
            let host = authority.rsplit('@').next().unwrap_or(authority);
            (host.to_string(), path)
        } else {
            return Err(invalid("not a git URL"));
        };

        let path = path.trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let (organisation, name) = path
            .rsplit_once('/')
            .ok_or_else(|| invalid("expected <organisation>/<repository>"))?;
        if host.is_empty() || organisation.is_empty() || name.is_empty() {
            return Err(invalid("expected <organisation>/<repository>"));
        }
        let organisation = match host.as_str() {
            // Local paths carry the whole directory; only the parent dir names the org.
            "localhost" => organisation.rsplit('/').next().unwrap_or(organisation),
            _ => organisation,
        };

        Ok(Self {
            host,
            organisation: organisation.to_string(),
            name: name.to_string(),
            clone_url: trimmed.to_string(),
        })
    }

    /// Resolve the repository from the `origin` remote of a working directory.
    pub async fn from_dir(path: &Path) -> Result<Self> {
        let url = GitClient::new(path.to_path_buf())
            .remote_url()
            .await
            .map_err(|_| Error::ProviderNotFound(path.display().to_string()))?;
        Self::parse(&url)
    }

    /// `organisation/name`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.organisation, self.name)
    }
}

impl Display for RepositoryReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.organisation, self.name)
    }
}

// -----------------------------------------------------------------------------
// BranchScheme

/// Deterministic branch naming for one kind of change.
///
/// The same `(subject, version)` always yields the same branch, so a retried
/// run lands on the branch of the earlier attempt instead of a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchScheme {
    prefix: String,
}

impl BranchScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn add_app() -> Self {
        Self::new("add-app")
    }

    pub fn branch_name(&self, subject: &str, version: &str) -> String {
        let raw = [self.prefix.as_str(), subject, version]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("-");
        let name = BRANCH_UNSAFE_RE.replace_all(&raw, "-");
        let name = name.replace("..", ".");
        name.trim_matches(|c| c == '-' || c == '.').to_string()
    }
}
