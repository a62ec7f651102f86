//! Integration layers for the external systems a run touches.
//!
//! - [`git`]: git CLI operations on a working copy (clone, branch, commit, push)
//! - [`http`]: curl-based HTTP transport with timeouts and retries
//! - [`github`]: GitHub REST backend for [`crate::provider::GitProvider`]
//! - [`vault`]: Vault KV backend for [`crate::secrets::SecretStore`]

pub mod git;
pub mod github;
pub mod http;
pub mod vault;
