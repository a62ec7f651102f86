use std::path::Path;
use std::path::PathBuf;

use anyhow::Context as _;
use tracing::info;

use super::report;
use crate::App;
use crate::clients::vault::VaultClient;
use crate::error::Error;
use crate::mutation::ManifestMutation;
use crate::provider::GitProvider;
use crate::provider::PullRequestSpec;
use crate::repo::BranchScheme;
use crate::schema::SchemaDefaults;
use crate::secrets::SecretMaterializer;
use crate::secrets::SecretScope;

/// Options of `app add`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct AddAppArgs {
    /// Chart name of the app
    pub name: String,
    /// Chart version to install
    #[arg(long)]
    pub version: String,
    /// URL of the chart repository serving the app
    #[arg(long = "chart-repo")]
    pub chart_repo: String,
    /// Release name, when it should differ from the chart name
    #[arg(long)]
    pub alias: Option<String>,
    /// JSON or YAML schema of the app's values
    #[arg(long)]
    pub schema: Option<PathBuf>,
    /// Git URL of the environment repository; defaults to the current
    /// directory's origin
    #[arg(long)]
    pub repo: Option<String>,
    /// Store secrets under this team instead of the environment repository
    #[arg(long)]
    pub team: Option<String>,
    /// Target branch; defaults to the remote's default branch
    #[arg(long)]
    pub base: Option<String>,
    /// Label to add to the pull request
    #[arg(long = "label")]
    pub labels: Vec<String>,
}

impl<P: GitProvider> App<P> {
    /// Add an app to the environment repository, or bump it, through a pull
    /// request.
    pub async fn cmd_add_app(
        &self,
        args: &AddAppArgs,
        stdout: &mut impl std::io::Write,
    ) -> anyhow::Result<()> {
        let schema = match &args.schema {
            Some(path) => Some(read_schema(path).await?),
            None => None,
        };
        let mutation = ManifestMutation::new(
            &args.name,
            &args.version,
            &args.chart_repo,
            schema,
            SchemaDefaults::default(),
            self.secret_materializer(args.team.as_deref()),
        )
        .with_alias(args.alias.clone());

        let branch = BranchScheme::add_app().branch_name(&args.name, &args.version);
        let spec = PullRequestSpec {
            base: args.base.clone().unwrap_or_default(),
            labels: args.labels.clone(),
            ..PullRequestSpec::new(
                format!("Add {} {}", args.name, args.version),
                format!("Add app {} {}", args.name, args.version),
            )
        };

        let handle = self
            .orchestrator()
            .execute(&self.repo, &branch, &mutation, &spec)
            .await?;
        report(handle.as_ref(), stdout)?;
        Ok(())
    }

    /// Secrets go to Vault when it is configured, else into the chart.
    fn secret_materializer(&self, team: Option<&str>) -> SecretMaterializer<VaultClient> {
        let Some(vault) = &self.config.vault else {
            info!("No secret store configured; embedding generated secrets in the chart");
            return SecretMaterializer::template();
        };
        let scope = match team {
            Some(team) => SecretScope::Team(team.to_string()),
            None => SecretScope::GitOps {
                organisation: self.repo.organisation.clone(),
                repository: self.repo.name.clone(),
            },
        };
        SecretMaterializer::store(VaultClient::new(vault, self.config.http.clone()), scope)
    }
}

async fn read_schema(path: &Path) -> anyhow::Result<serde_json::Value> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read schema {}", path.display()))?;
    // YAML is a superset of JSON, so one parser takes both
    serde_yml::from_str(&contents).map_err(|e| {
        Error::InvalidOption {
            option: "schema".to_string(),
            value: path.display().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::config::VaultConfig;
    use crate::provider::tests::MockProvider;
    use crate::repo::RepositoryReference;
    use crate::secrets::APPS_GENERATED_SECRETS_KEY;
    use crate::workspace::tests::bare_remote;
    use crate::workspace::tests::remote_log;

    const REQUIREMENTS: &str = "dependencies:\n- name: exposecontroller\n  version: 2.3.56\n  repository: https://charts.example.com\n";

    fn args(version: &str) -> AddAppArgs {
        AddAppArgs {
            name: "nginx".to_string(),
            version: version.to_string(),
            chart_repo: "https://charts.example.com".to_string(),
            ..Default::default()
        }
    }

    async fn show(repo: &RepositoryReference, branch: &str, path: &str) -> String {
        let output = tokio::process::Command::new("git")
            .args(["show", &format!("{branch}:{path}")])
            .current_dir(&repo.clone_url)
            .output()
            .await
            .unwrap();
        String::from_utf8(output.stdout).unwrap()
    }

    #[tokio::test]
    async fn test_add_app() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let repo = bare_remote(tmp.path(), &[("env/requirements.yaml", REQUIREMENTS)]).await;
        let app = App::new(Config::default_for_tests(), MockProvider::default(), repo.clone());

        let mut out = Vec::new();
        app.cmd_add_app(&args("1.2.3"), &mut out).await?;
        insta::assert_snapshot!(String::from_utf8(out)?, @"Pull request: https://github.com/remotes/env-dev/pull/1");

        assert_eq!(app.provider.prs.borrow()[0].head, "add-app-nginx-1.2.3");
        assert_eq!(
            remote_log(&repo, "add-app-nginx-1.2.3").await[0],
            "Add nginx 1.2.3"
        );
        let requirements = show(&repo, "add-app-nginx-1.2.3", "env/requirements.yaml").await;
        assert!(requirements.contains("exposecontroller"));
        assert!(requirements.contains("name: nginx"));
        Ok(())
    }

    #[tokio::test]
    async fn test_add_app_with_schema_embeds_secrets() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let repo = bare_remote(tmp.path(), &[("env/requirements.yaml", REQUIREMENTS)]).await;
        let schema = tmp.path().join("values.schema.json");
        std::fs::write(
            &schema,
            r#"{"properties": {"adminPassword": {"type": "string", "format": "password"}}}"#,
        )?;
        let app = App::new(Config::default_for_tests(), MockProvider::default(), repo.clone());

        let args = AddAppArgs {
            schema: Some(schema),
            alias: Some("web".to_string()),
            ..args("1.2.3")
        };
        app.cmd_add_app(&args, &mut Vec::new()).await?;

        let values = show(&repo, "add-app-nginx-1.2.3", "env/web/values.yaml").await;
        assert!(values.contains(APPS_GENERATED_SECRETS_KEY));
        assert!(values.contains("nginx-adminpassword"));
        let template = show(
            &repo,
            "add-app-nginx-1.2.3",
            "env/web/templates/app-generated-secret-template.yaml",
        )
        .await;
        assert!(template.contains("kind: Secret"));
        Ok(())
    }

    #[tokio::test]
    async fn test_rerun_with_schema_adds_no_commit() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let repo = bare_remote(tmp.path(), &[("env/requirements.yaml", REQUIREMENTS)]).await;
        let schema = tmp.path().join("values.schema.json");
        std::fs::write(
            &schema,
            r#"{"properties": {"adminPassword": {"type": "string", "format": "password"}}}"#,
        )?;
        let app = App::new(Config::default_for_tests(), MockProvider::default(), repo.clone());
        let args = AddAppArgs {
            schema: Some(schema),
            ..args("1.2.3")
        };

        app.cmd_add_app(&args, &mut Vec::new()).await?;
        let values = show(&repo, "add-app-nginx-1.2.3", "env/nginx/values.yaml").await;

        let mut out = Vec::new();
        app.cmd_add_app(&args, &mut out).await?;
        insta::assert_snapshot!(String::from_utf8(out)?, @"Pull request: https://github.com/remotes/env-dev/pull/1");

        assert_eq!(remote_log(&repo, "add-app-nginx-1.2.3").await.len(), 2);
        assert_eq!(
            show(&repo, "add-app-nginx-1.2.3", "env/nginx/values.yaml").await,
            values
        );
        assert_eq!(*app.provider.creates.borrow(), 1);
        assert_eq!(*app.provider.updates.borrow(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_schema() {
        let tmp = tempfile::tempdir().unwrap();
        let schema = tmp.path().join("values.schema.json");
        std::fs::write(&schema, "{ unclosed").unwrap();
        let repo = RepositoryReference::parse("https://github.com/acme/env").unwrap();
        let app = App::new(Config::default_for_tests(), MockProvider::default(), repo);

        let args = AddAppArgs {
            schema: Some(schema),
            ..args("1.2.3")
        };
        let err = app.cmd_add_app(&args, &mut Vec::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::InvalidOption { option, .. }) if option == "schema"
        ));
    }

    #[test]
    fn test_secret_route_follows_vault_config() {
        let repo = RepositoryReference::parse("https://github.com/acme/env").unwrap();
        let mut config = Config::default_for_tests();
        assert!(
            !App::new(config.clone(), MockProvider::default(), repo.clone())
                .secret_materializer(None)
                .uses_store()
        );

        config.vault = Some(VaultConfig {
            addr: "https://vault.example.com".to_string(),
            token: "t".to_string(),
            mount: "secret".to_string(),
        });
        let app = App::new(config, MockProvider::default(), repo);
        assert!(app.secret_materializer(Some("core")).uses_store());
    }
}
