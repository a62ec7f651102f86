use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use super::Mutation;
use super::MutationOutcome;
use super::write_if_changed;
use crate::error::Error;
use crate::error::Result;
use crate::schema::ValuesGenerator;
use crate::secrets::APPS_GENERATED_SECRETS_KEY;
use crate::secrets::ExistingSecrets;
use crate::secrets::SecretMaterializer;
use crate::secrets::SecretStore;

pub const REQUIREMENTS_FILE: &str = "requirements.yaml";
pub const VALUES_FILE: &str = "values.yaml";

// -----------------------------------------------------------------------------
// Types

/// The environment chart's `requirements.yaml`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Requirements {
    #[serde(default)]
    dependencies: Vec<Dependency>,
    #[serde(flatten)]
    other: BTreeMap<String, serde_yml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dependency {
    name: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repository: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alias: Option<String>,
    #[serde(flatten)]
    other: BTreeMap<String, serde_yml::Value>,
}

/// Adds an app to an environment, or bumps it to a new version.
///
/// Edits `<env>/requirements.yaml`. With a values schema, also generates the
/// app's values overlay at `<env>/<release>/values.yaml` and materializes the
/// generated secrets, where `<release>` is the alias or else the app name.
pub struct ManifestMutation<G, S> {
    app: String,
    version: String,
    /// Chart repository URL.
    repository: String,
    alias: Option<String>,
    env_dir: PathBuf,
    schema: Option<serde_json::Value>,
    generator: G,
    secrets: SecretMaterializer<S>,
}

// -----------------------------------------------------------------------------
// ManifestMutation impl

impl<G: ValuesGenerator, S: SecretStore> ManifestMutation<G, S> {
    pub fn new(
        app: impl Into<String>,
        version: impl Into<String>,
        repository: impl Into<String>,
        schema: Option<serde_json::Value>,
        generator: G,
        secrets: SecretMaterializer<S>,
    ) -> Self {
        Self {
            app: app.into(),
            version: version.into(),
            repository: repository.into(),
            alias: None,
            env_dir: PathBuf::from("env"),
            schema,
            generator,
            secrets,
        }
    }

    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias.filter(|a| !a.is_empty());
        self
    }

    /// Directory of the environment chart, relative to the repository root.
    pub fn with_env_dir(mut self, env_dir: impl Into<PathBuf>) -> Self {
        self.env_dir = env_dir.into();
        self
    }

    fn release_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.app)
    }

    /// Add or bump the app's dependency. Returns the new file contents.
    fn update_requirements(&self, path: &Path, existing: Option<&str>) -> Result<String> {
        let mut requirements: Requirements = match existing {
            Some(contents) if !contents.trim().is_empty() => serde_yml::from_str(contents)
                .map_err(|e| Error::Manifest {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?,
            _ => Requirements::default(),
        };

        match requirements
            .dependencies
            .iter_mut()
            .find(|d| d.name == self.app && d.alias == self.alias)
        {
            Some(dependency) if dependency.version == self.version => {
                info!("App {} {} is already installed", self.app, self.version);
            }
            Some(dependency) => {
                info!(
                    "Upgrading app {} from {} to {}",
                    self.app, dependency.version, self.version
                );
                dependency.version = self.version.clone();
                dependency.repository = Some(self.repository.clone());
            }
            None => {
                info!("Adding app {} {}", self.app, self.version);
                requirements.dependencies.push(Dependency {
                    name: self.app.clone(),
                    version: self.version.clone(),
                    repository: Some(self.repository.clone()),
                    alias: self.alias.clone(),
                    other: BTreeMap::new(),
                });
            }
        }

        serde_yml::to_string(&requirements).map_err(|e| Error::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    async fn write_values(&self, dir: &Path, schema: &serde_json::Value) -> Result<Vec<PathBuf>> {
        let generated = self.generator.generate(&self.app, schema)?;
        let app_dir = dir.join(&self.env_dir).join(self.release_name());
        let values_path = app_dir.join(VALUES_FILE);

        let existing = read_overlay(&values_path).await?;
        let targets = self.secrets.plan(
            generated.secrets,
            &app_dir.join("templates"),
            &ExistingSecrets::from_values(&existing),
        );
        let materialized = self.secrets.materialize(targets).await?;
        let mut written = materialized.written_files;

        let mut values = generated.values;
        if !materialized.embedded.is_empty() {
            let object = values.as_object_mut().ok_or_else(|| {
                Error::Schema("generated values must be an object to embed secrets".to_string())
            })?;
            let embedded = serde_json::to_value(&materialized.embedded)
                .map_err(|e| Error::Schema(e.to_string()))?;
            object.insert(APPS_GENERATED_SECRETS_KEY.to_string(), embedded);
        }

        let values_yaml = serde_yml::to_string(&values).map_err(|e| Error::Manifest {
            path: values_path.clone(),
            message: e.to_string(),
        })?;
        if write_if_changed(&values_path, &values_yaml).await? {
            written.push(values_path);
        }
        Ok(written)
    }
}

/// The values overlay an earlier run wrote, or null when there is none.
async fn read_overlay(path: &Path) -> Result<serde_json::Value> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => serde_yml::from_str(&contents).map_err(|e| Error::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(serde_json::Value::Null),
        Err(source) => Err(Error::MutationIo {
            op: "read",
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl<G: ValuesGenerator, S: SecretStore> Mutation for ManifestMutation<G, S> {
    async fn apply(&self, dir: &Path) -> Result<MutationOutcome> {
        let mut outcome = MutationOutcome::default();

        let requirements_path = dir.join(&self.env_dir).join(REQUIREMENTS_FILE);
        let existing = match tokio::fs::read_to_string(&requirements_path).await {
            Ok(contents) => Some(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(Error::MutationIo {
                    op: "read",
                    path: requirements_path,
                    source,
                });
            }
        };
        let requirements = self.update_requirements(&requirements_path, existing.as_deref())?;
        if write_if_changed(&requirements_path, &requirements).await? {
            outcome.record(dir, &requirements_path);
        }

        if let Some(schema) = &self.schema {
            for path in self.write_values(dir, schema).await? {
                outcome.record(dir, &path);
            }
        }

        Ok(outcome)
    }
}
