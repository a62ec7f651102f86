//! Mutation strategies: transformations applied to a working copy.
//!
//! - [`regex`]: substitute a version into files matched by globs
//! - [`manifest`]: add or bump an app in an environment's requirements,
//!   alongside its values overlay and generated secrets

#![allow(async_fn_in_trait)]

pub mod manifest;
pub mod regex;

use std::path::Path;
use std::path::PathBuf;

use globset::GlobBuilder;
use globset::GlobSetBuilder;
use walkdir::WalkDir;

use crate::error::Error;
use crate::error::Result;

pub use self::manifest::ManifestMutation;
pub use self::regex::RegexMutation;

/// Files a mutation rewrote, relative to the working copy root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationOutcome {
    pub changed_files: Vec<PathBuf>,
}

impl MutationOutcome {
    pub fn has_diff(&self) -> bool {
        !self.changed_files.is_empty()
    }

    pub(crate) fn record(&mut self, root: &Path, path: &Path) {
        let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
        if !self.changed_files.contains(&relative) {
            self.changed_files.push(relative);
        }
    }
}

/// A transformation of a working copy.
pub trait Mutation {
    /// Rewrite files under `dir` and report which ones changed.
    async fn apply(&self, dir: &Path) -> Result<MutationOutcome>;
}

/// Write `contents` to `path` unless it already holds exactly that.
///
/// Returns whether the file was written.
pub(crate) async fn write_if_changed(path: &Path, contents: &str) -> Result<bool> {
    match tokio::fs::read_to_string(path).await {
        Ok(existing) if existing == contents => return Ok(false),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(Error::MutationIo {
                op: "read",
                path: path.to_path_buf(),
                source,
            });
        }
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| Error::MutationIo {
                op: "create",
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| Error::MutationIo {
            op: "write",
            path: path.to_path_buf(),
            source,
        })?;
    Ok(true)
}

// -----------------------------------------------------------------------------
// Globs

/// Files under `dir` matching any of `globs`, sorted and deduplicated.
///
/// Globs are relative to `dir` and use `/` separators. `*` and `?` stay within
/// one path segment, `**` crosses segments, `[...]` is a character class.
/// The `.git` directory is never matched.
pub fn resolve_globs(dir: &Path, globs: &[String]) -> Result<Vec<PathBuf>> {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        let pattern = GlobBuilder::new(glob.trim_start_matches("./"))
            .literal_separator(true)
            .backslash_escape(true)
            .build()
            .map_err(|e| Error::InvalidOption {
                option: "files".to_string(),
                value: glob.clone(),
                reason: e.kind().to_string(),
            })?;
        builder.add(pattern);
    }
    let set = builder.build().map_err(|e| Error::InvalidOption {
        option: "files".to_string(),
        value: globs.join(" "),
        reason: e.to_string(),
    })?;

    let mut files = vec![];
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");
    for entry in walker {
        let entry = entry.map_err(|err| Error::MutationIo {
            op: "list",
            path: err.path().unwrap_or(dir).to_path_buf(),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        if set.is_match(relative) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}
