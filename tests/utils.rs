#![allow(dead_code)]

use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer as _;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

async fn git(dir: &Path, args: &[&str]) -> anyhow::Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    anyhow::ensure!(status.success(), "git {} failed", args.join(" "));
    Ok(())
}

/// Creates a git repository in the given directory.
///
/// This initializes the repo on `main` and sets basic git config needed for
/// commits. The directory should already exist.
pub async fn create_git_repo(dir: &Path) -> anyhow::Result<()> {
    git(dir, &["init", "--initial-branch=main"]).await?;
    git(dir, &["config", "user.name", "Test User"]).await?;
    git(dir, &["config", "user.email", "test@example.com"]).await?;
    Ok(())
}

/// Creates a bare repository at `<dir>/<org>/<name>.git` to act as the remote.
pub async fn create_bare_remote(dir: &Path, org: &str, name: &str) -> anyhow::Result<PathBuf> {
    let remote = dir.join(org).join(format!("{name}.git"));
    tokio::fs::create_dir_all(&remote).await?;
    git(&remote, &["init", "--bare", "--initial-branch=main"]).await?;
    Ok(remote)
}

/// Writes files into a repository and commits them.
pub async fn commit_files(dir: &Path, message: &str, files: &[(&str, &str)]) -> anyhow::Result<()> {
    for (path, contents) in files {
        let path = dir.join(path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, contents).await?;
    }
    git(dir, &["add", "--all"]).await?;
    git(dir, &["commit", "-m", message]).await?;
    Ok(())
}

/// Pushes `main` of `dir` to `remote`.
pub async fn push_main(dir: &Path, remote: &Path) -> anyhow::Result<()> {
    let remote = remote.to_string_lossy();
    git(dir, &["push", &remote, "main:main"]).await
}

/// Creates a remote at `<dir>/<org>/<name>.git` whose `main` holds `files`.
pub async fn seeded_remote(
    dir: &Path,
    org: &str,
    name: &str,
    files: &[(&str, &str)],
) -> anyhow::Result<PathBuf> {
    let remote = create_bare_remote(dir, org, name).await?;
    let seed = dir.join("seed");
    tokio::fs::create_dir_all(&seed).await?;
    create_git_repo(&seed).await?;
    commit_files(&seed, "Initial commit", files).await?;
    push_main(&seed, &remote).await?;
    tokio::fs::remove_dir_all(&seed).await?;
    Ok(remote)
}

/// Gets the subject lines of a branch of a repository, newest first.
pub async fn git_log(dir: &Path, branch: &str) -> anyhow::Result<String> {
    let output = Command::new("git")
        .args(["log", "--format=%s", branch])
        .current_dir(dir)
        .output()
        .await?;
    anyhow::ensure!(output.status.success(), "git log failed");

    Ok(String::from_utf8(output.stdout)?)
}

/// Lists the branches of a repository.
pub async fn git_branches(dir: &Path) -> anyhow::Result<String> {
    let output = Command::new("git")
        .args(["branch", "--format=%(refname:short)"])
        .current_dir(dir)
        .output()
        .await?;
    anyhow::ensure!(output.status.success(), "git branch failed");

    Ok(String::from_utf8(output.stdout)?)
}

/// Gets the contents of a file at a revision.
pub async fn git_show(dir: &Path, rev: &str, path: &str) -> anyhow::Result<String> {
    let output = Command::new("git")
        .args(["show", &format!("{rev}:{path}")])
        .current_dir(dir)
        .output()
        .await?;
    anyhow::ensure!(output.status.success(), "git show failed");

    Ok(String::from_utf8(output.stdout)?)
}

pub fn setup_logging() -> anyhow::Result<()> {
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%H:%M:%S%.3f".into());
    let format = tracing_subscriber::fmt::format().with_timer(timer);
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    let subscriber = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_filter(filter);
    tracing_subscriber::registry().with(subscriber).init();
    Ok(())
}

pub enum TestDir {
    Temp(tempfile::TempDir),
    Kept(std::path::PathBuf),
}

impl TestDir {
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;

        if std::env::var("DEBUG_TESTS").is_ok() {
            let path = temp_dir.keep();
            eprintln!("Test directory kept at: {}", path.display());
            Ok(TestDir::Kept(path))
        } else {
            Ok(TestDir::Temp(temp_dir))
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            TestDir::Temp(t) => t.path(),
            TestDir::Kept(p) => p.as_path(),
        }
    }
}
