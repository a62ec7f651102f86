//! Error types for pull request mutation runs.

use std::path::PathBuf;

use thiserror::Error;

/// Whether a failed remote call is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Timeouts, connection failures, 5xx and rate limiting.
    Transient,
    /// Not found, forbidden, validation failures and anything else.
    Definitive,
}

/// A failed call to a remote HTTP API.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    /// HTTP status, if the server answered at all.
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn transient(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Transient,
            status,
            message: message.into(),
        }
    }

    pub fn definitive(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Definitive,
            status,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ApiErrorKind::Transient
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing option: --{0}")]
    MissingOption(String),

    #[error("invalid option --{option} '{value}': {reason}")]
    InvalidOption {
        option: String,
        value: String,
        reason: String,
    },

    #[error(
        "no git provider could be found for {0}. Are you in a directory containing a `.git/config` file?"
    )]
    ProviderNotFound(String),

    #[error("failed to compile regex '{pattern}': {source}")]
    RegexCompile {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("regex '{pattern}' matched nothing in {globs:?}")]
    NoMatch { pattern: String, globs: Vec<String> },

    #[error("failed to {op} {path}: {source}")]
    MutationIo {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("values schema: {0}")]
    Schema(String),

    #[error("failed to write secret {path}: {source}")]
    SecretStore {
        path: String,
        #[source]
        source: ApiError,
    },

    #[error("git {op} failed for {repo} (branch {branch}): {message}")]
    Workspace {
        op: &'static str,
        repo: String,
        branch: String,
        message: String,
    },

    #[error("{op} failed for {target}: {source}")]
    ProviderApi {
        op: &'static str,
        target: String,
        #[source]
        source: ApiError,
    },

    #[error("pull request {url} still open after {}s", timeout.as_secs())]
    MergeTimeout {
        url: String,
        timeout: std::time::Duration,
    },

    #[error("cancelled before {step}")]
    Cancelled { step: &'static str },
}

impl Error {
    /// True for remote failures that a caller may retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ProviderApi { source, .. } | Self::SecretStore { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
