use std::time::Duration;

/// Default prefix for label environment keys.
pub const DEFAULT_LABEL_PREFIX: &str = "PR_LABELS";

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone)]
pub struct Config {
    /// Never prompt for input.
    pub batch_mode: bool,
    /// Branch identifier of the pipeline run, e.g. `PR-34`.
    pub branch_name: Option<String>,
    pub label_prefix: String,
    pub github_token: Option<String>,
    pub github_api_url: String,
    /// Hosts other than github.com that are served by the GitHub backend.
    pub github_hosts: Vec<String>,
    pub vault: Option<VaultConfig>,
    pub http: HttpSettings,
}

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub addr: String,
    pub token: String,
    /// KV v2 mount the secrets are written under.
    pub mount: String,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    /// Extra attempts for transient failures.
    pub retries: u32,
    /// Delay before the first retry; doubled on each further attempt.
    pub backoff: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Load config from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let vault = match (get("VAULT_ADDR"), get("VAULT_TOKEN")) {
            (Some(addr), Some(token)) => Some(VaultConfig {
                addr: addr.trim_end_matches('/').to_string(),
                token,
                mount: get("VAULT_MOUNT").unwrap_or_else(|| "secret".to_string()),
            }),
            _ => None,
        };

        let mut http = HttpSettings::default();
        if let Some(secs) = get("GITOPS_PR_HTTP_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            http.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = get("GITOPS_PR_HTTP_RETRIES").and_then(|s| s.parse().ok()) {
            http.retries = retries;
        }

        Self {
            batch_mode: get("GITOPS_PR_BATCH").is_some_and(|v| v == "true" || v == "1"),
            branch_name: get("BRANCH_NAME"),
            label_prefix: get("GITOPS_PR_LABEL_PREFIX")
                .unwrap_or_else(|| DEFAULT_LABEL_PREFIX.to_string()),
            github_token: get("GITHUB_TOKEN").or_else(|| get("GH_TOKEN")),
            github_api_url: get("GITHUB_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
            github_hosts: get("GITOPS_PR_GITHUB_HOSTS")
                .map(|hosts| {
                    hosts
                        .split(',')
                        .map(|h| h.trim().to_string())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            vault,
            http,
        }
    }

    /// Default config for tests
    pub fn default_for_tests() -> Self {
        Self::from_lookup(|_| None)
    }
}
