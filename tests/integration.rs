//! cargo test --test integration -- --nocapture

mod macros;
mod utils;

use std::cell::RefCell;

use gitops_pr::App;
use gitops_pr::Config;
use gitops_pr::Error;
use gitops_pr::RepositoryReference;
use gitops_pr::commands::create_regex::CreateRegexArgs;
use gitops_pr::commands::labels::LabelsArgs;
use gitops_pr::mutation::RegexMutation;
use gitops_pr::orchestrator::PullRequestOrchestrator;
use gitops_pr::provider::GitProvider;
use gitops_pr::provider::Label;
use gitops_pr::provider::MergeState;
use gitops_pr::provider::PullRequest;
use gitops_pr::provider::PullRequestHandle;
use gitops_pr::provider::PullRequestId;
use gitops_pr::provider::PullRequestSpec;
use gitops_pr::repo::BranchScheme;
use tokio_util::sync::CancellationToken;

const ORG: &str = "acme";
const REPO: &str = "env-dev";

const VALUES: &str = r#"platform:
  Image: "app"
  ImageTag: "1.0.0"
  Image: "sidecar"
  ImageTag: "0.4.0"
"#;

#[ctor::ctor]
fn init() {
    // Disable colors for all integration tests to get clean output
    colored::control::set_override(false);
    utils::setup_logging().unwrap();
}

/// Provider that keeps pull requests in memory and records every call.
#[derive(Default)]
struct RecordingProvider {
    prs: RefCell<Vec<PullRequest>>,
    calls: RefCell<Vec<String>>,
}

impl GitProvider for RecordingProvider {
    async fn get_pull_request(
        &self,
        repo: &RepositoryReference,
        id: &PullRequestId,
    ) -> gitops_pr::error::Result<PullRequest> {
        self.calls.borrow_mut().push(format!("get {id}"));
        self.prs
            .borrow()
            .iter()
            .find(|pr| Some(pr.number) == id.number)
            .cloned()
            .ok_or_else(|| Error::ProviderApi {
                op: "get pull request",
                target: format!("{}#{}", repo.full_name(), id),
                source: gitops_pr::error::ApiError::definitive(Some(404), "Not Found"),
            })
    }

    async fn list_labels(
        &self,
        _repo: &RepositoryReference,
        pr: &PullRequest,
    ) -> gitops_pr::error::Result<Vec<Label>> {
        self.calls.borrow_mut().push(format!("labels {}", pr.number));
        Ok(pr.labels.clone())
    }

    async fn find_open_pull_request(
        &self,
        _repo: &RepositoryReference,
        head: &str,
        base: &str,
    ) -> gitops_pr::error::Result<Option<PullRequestHandle>> {
        self.calls.borrow_mut().push(format!("find {head} -> {base}"));
        Ok(self
            .prs
            .borrow()
            .iter()
            .find(|pr| pr.head == head && pr.base == base && pr.state == MergeState::Open)
            .map(PullRequestHandle::from))
    }

    async fn create_pull_request(
        &self,
        repo: &RepositoryReference,
        spec: &PullRequestSpec,
    ) -> gitops_pr::error::Result<PullRequestHandle> {
        self.calls
            .borrow_mut()
            .push(format!("create {} -> {}", spec.branch, spec.base));
        let mut prs = self.prs.borrow_mut();
        let pr = PullRequest {
            number: prs.len() as u64 + 1,
            url: format!(
                "https://github.com/{}/pull/{}",
                repo.full_name(),
                prs.len() + 1
            ),
            state: MergeState::Open,
            title: spec.title.clone(),
            head: spec.branch.clone(),
            base: spec.base.clone(),
            labels: spec
                .labels
                .iter()
                .map(|name| Label { name: name.clone() })
                .collect(),
        };
        let handle = PullRequestHandle::from(&pr);
        prs.push(pr);
        Ok(handle)
    }

    async fn update_pull_request(
        &self,
        _repo: &RepositoryReference,
        handle: &PullRequestHandle,
        spec: &PullRequestSpec,
    ) -> gitops_pr::error::Result<PullRequestHandle> {
        self.calls
            .borrow_mut()
            .push(format!("update #{}", handle.number));
        let mut prs = self.prs.borrow_mut();
        let pr = &mut prs[handle.number as usize - 1];
        pr.title = spec.title.clone();
        Ok(PullRequestHandle::from(&*pr))
    }
}

async fn setup(dir: &std::path::Path) -> anyhow::Result<RepositoryReference> {
    let remote = utils::seeded_remote(dir, ORG, REPO, &[("env/values.yaml", VALUES)]).await?;
    Ok(RepositoryReference::parse(&remote.to_string_lossy())?)
}

#[tokio::test]
async fn test_image_tag_bump_opens_one_pull_request() -> anyhow::Result<()> {
    let test_dir = utils::TestDir::new()?;
    let repo = setup(test_dir.path()).await?;
    assert_eq!(repo.full_name(), "acme/env-dev");

    let provider = RecordingProvider::default();
    let orchestrator = PullRequestOrchestrator::new(&provider, CancellationToken::new());
    let mutation = RegexMutation::new(
        "2.0.0",
        r#"(?m)^\s+Image: "app"\s+ImageTag: "(.*)"$"#,
        vec!["env/*.yaml".to_string()],
    )?;
    let branch = BranchScheme::add_app().branch_name("app", "2.0.0");
    let spec = PullRequestSpec::new("Bump app to 2.0.0", "Bump app");

    let handle = orchestrator
        .execute(&repo, &branch, &mutation, &spec)
        .await?
        .expect("a pull request");
    assert_eq!(handle.number, 1);

    let remote = std::path::Path::new(&repo.clone_url);
    insta::assert_snapshot!(utils::git_branches(remote).await?, @r"
    add-app-app-2.0.0
    main
    ");
    insta::assert_snapshot!(utils::git_log(remote, "add-app-app-2.0.0").await?, @r"
    Bump app to 2.0.0
    Initial commit
    ");
    insta::assert_snapshot!(utils::git_show(remote, "add-app-app-2.0.0", "env/values.yaml").await?, @r#"
    platform:
      Image: "app"
      ImageTag: "2.0.0"
      Image: "sidecar"
      ImageTag: "0.4.0"
    "#);
    insta::assert_snapshot!(provider.calls.borrow().join("\n"), @r"
    find add-app-app-2.0.0 -> main
    create add-app-app-2.0.0 -> main
    ");

    Ok(())
}

#[tokio::test]
async fn test_create_regex_then_labels() -> anyhow::Result<()> {
    let test_dir = utils::TestDir::new()?;
    let repo = setup(test_dir.path()).await?;
    let app = App::new(Config::default_for_tests(), RecordingProvider::default(), repo);

    let args = CreateRegexArgs {
        regex: r#"^\s+Image: "sidecar"\s+ImageTag: "(.*)"$"#.to_string(),
        version: "0.5.0".to_string(),
        files: vec!["**/values.yaml".to_string()],
        src_repo: Some("https://github.com/acme/sidecar.git".to_string()),
        labels: vec!["updatebot".to_string(), "env/dev".to_string()],
        kind: "regex".to_string(),
        ..Default::default()
    };
    let out = run_and_capture!(|out| app.cmd_create_regex(&args, out));
    insta::assert_snapshot!(out, @"Pull request: https://github.com/acme/env-dev/pull/1");

    // Identical inputs update the open pull request instead of opening another
    let out = run_and_capture!(|out| app.cmd_create_regex(&args, out));
    insta::assert_snapshot!(out, @"Pull request: https://github.com/acme/env-dev/pull/1");

    let args = CreateRegexArgs {
        version: "0.6.0".to_string(),
        ..args
    };
    let out = run_and_capture!(|out| app.cmd_create_regex(&args, out));
    insta::assert_snapshot!(out, @"Pull request: https://github.com/acme/env-dev/pull/2");
    assert_eq!(app.provider.prs.borrow().len(), 2);

    let labels = LabelsArgs {
        pr: Some("PR-1".to_string()),
        ..Default::default()
    };
    let out = run_and_capture!(|out| app.cmd_labels(&labels, out));
    insta::assert_snapshot!(out, @r"
    PR_LABELS_UPDATEBOT='updatebot'
    PR_LABELS_ENV_DEV='env/dev'
    ");

    Ok(())
}

#[tokio::test]
async fn test_zero_matches_fails_without_pushing() -> anyhow::Result<()> {
    let test_dir = utils::TestDir::new()?;
    let repo = setup(test_dir.path()).await?;
    let app = App::new(Config::default_for_tests(), RecordingProvider::default(), repo);

    let args = CreateRegexArgs {
        regex: r#"^\s+Image: "missing"\s+ImageTag: "(.*)"$"#.to_string(),
        version: "0.5.0".to_string(),
        files: vec!["env/*.yaml".to_string()],
        kind: "regex".to_string(),
        ..Default::default()
    };
    let err = app
        .cmd_create_regex(&args, &mut Vec::new())
        .await
        .unwrap_err();
    insta::assert_snapshot!(err.to_string(), @r#"regex '(?m)^\s+Image: "missing"\s+ImageTag: "(.*)"$' matched nothing in ["env/*.yaml"]"#);
    assert!(app.provider.calls.borrow().is_empty());

    let remote = std::path::Path::new(&app.repo.clone_url);
    insta::assert_snapshot!(utils::git_branches(remote).await?, @"main");

    Ok(())
}
