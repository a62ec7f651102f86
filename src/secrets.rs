//! Routing generated secrets to a secret store or into the chart.
//!
//! One invocation routes every secret the same way: either each one is
//! written to the store, or all of them are embedded in the values overlay
//! next to a template that turns them into `Secret` objects at render time.

#![allow(async_fn_in_trait)]

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::error::ApiError;
use crate::error::Error;
use crate::error::Result;
use crate::mutation::write_if_changed;
use crate::schema::GeneratedSecret;

/// Values key holding embedded secrets.
pub const APPS_GENERATED_SECRETS_KEY: &str = "appsGeneratedSecrets";

pub const SECRET_TEMPLATE_FILE: &str = "app-generated-secret-template.yaml";

/// Renders one `Secret` per entry under [`APPS_GENERATED_SECRETS_KEY`].
pub const SECRET_TEMPLATE: &str = r#"{{- range .Values.appsGeneratedSecrets }}
---
apiVersion: v1
kind: Secret
metadata:
  name: {{ .name }}
type: Opaque
data:
  {{ .key }}: {{ .value }}
{{- end }}
"#;

// -----------------------------------------------------------------------------
// Types

/// Persistent storage for secrets, keyed by path.
pub trait SecretStore {
    async fn write(&self, path: &str, data: &BTreeMap<String, String>) -> Result<()>;
}

/// Whose secrets these are; decides the store path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretScope {
    /// An environment managed through a GitOps repository.
    GitOps {
        organisation: String,
        repository: String,
    },
    Team(String),
}

impl SecretScope {
    pub fn base_path(&self) -> String {
        match self {
            Self::GitOps {
                organisation,
                repository,
            } => format!("gitOps/{}/{}", organisation, repository),
            Self::Team(team) => format!("teams/{}", team),
        }
    }
}

/// A secret as embedded in the values overlay, value base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedSecret {
    pub name: String,
    pub key: String,
    pub value: String,
}

/// Destination of one secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretTarget {
    StoreWrite {
        path: String,
        data: BTreeMap<String, String>,
    },
    TemplateEmbed {
        /// Template file that renders the embedded entries.
        file: PathBuf,
        entry: EmbeddedSecret,
    },
}

/// Secrets a values overlay from an earlier run already provides.
#[derive(Debug, Default)]
pub struct ExistingSecrets {
    /// Entries under [`APPS_GENERATED_SECRETS_KEY`], by name.
    embedded: BTreeMap<String, EmbeddedSecret>,
    /// Names of `{kind: Secret, name}` references anywhere in the overlay.
    referenced: BTreeSet<String>,
}

impl ExistingSecrets {
    pub fn from_values(values: &serde_json::Value) -> Self {
        let mut existing = Self::default();
        if let Some(entries) = values.get(APPS_GENERATED_SECRETS_KEY) {
            let entries: Vec<EmbeddedSecret> =
                serde_json::from_value(entries.clone()).unwrap_or_default();
            existing.embedded = entries.into_iter().map(|e| (e.name.clone(), e)).collect();
        }
        collect_references(values, &mut existing.referenced);
        existing
    }

    fn embedded(&self, secret: &GeneratedSecret) -> Option<&EmbeddedSecret> {
        self.embedded
            .get(&secret.name)
            .filter(|entry| entry.key == secret.key)
    }

    /// Referenced from the overlay but held elsewhere, i.e. in the store.
    fn stored(&self, secret: &GeneratedSecret) -> bool {
        self.referenced.contains(&secret.name) && !self.embedded.contains_key(&secret.name)
    }
}

fn collect_references(value: &serde_json::Value, names: &mut BTreeSet<String>) {
    match value {
        serde_json::Value::Object(object) => {
            if object.get("kind").and_then(|k| k.as_str()) == Some("Secret") {
                if let Some(name) = object.get("name").and_then(|n| n.as_str()) {
                    names.insert(name.to_string());
                }
            }
            for (key, child) in object {
                if key != APPS_GENERATED_SECRETS_KEY {
                    collect_references(child, names);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_references(item, names);
            }
        }
        _ => {}
    }
}

#[derive(Debug, Default)]
pub struct MaterializedSecrets {
    /// Entries to add to the values overlay.
    pub embedded: Vec<EmbeddedSecret>,
    /// Files created or changed.
    pub written_files: Vec<PathBuf>,
    pub store_writes: usize,
}

enum Route<S> {
    Store { store: S, scope: SecretScope },
    Template,
}

pub struct SecretMaterializer<S> {
    route: Route<S>,
}

// -----------------------------------------------------------------------------
// SecretMaterializer impl

impl<S: SecretStore> SecretMaterializer<S> {
    pub fn store(store: S, scope: SecretScope) -> Self {
        Self {
            route: Route::Store { store, scope },
        }
    }

    pub fn template() -> Self {
        Self {
            route: Route::Template,
        }
    }

    pub fn uses_store(&self) -> bool {
        matches!(self.route, Route::Store { .. })
    }

    /// Decide where each secret goes. `templates_dir` is the chart's
    /// templates directory.
    ///
    /// Secrets `existing` already provides keep their current value: embedded
    /// entries are carried over and stored secrets are not rewritten.
    pub fn plan(
        &self,
        secrets: Vec<GeneratedSecret>,
        templates_dir: &Path,
        existing: &ExistingSecrets,
    ) -> Vec<SecretTarget> {
        secrets
            .into_iter()
            .filter_map(|secret| match &self.route {
                Route::Store { scope, .. } => {
                    let path = format!("{}/{}", scope.base_path(), secret.name);
                    if existing.stored(&secret) {
                        debug!("Keeping secret {}", path);
                        return None;
                    }
                    Some(SecretTarget::StoreWrite {
                        path,
                        data: BTreeMap::from([(secret.key, secret.value)]),
                    })
                }
                Route::Template => {
                    let entry = match existing.embedded(&secret) {
                        Some(entry) => entry.clone(),
                        None => EmbeddedSecret {
                            name: secret.name,
                            key: secret.key,
                            value: BASE64.encode(secret.value),
                        },
                    };
                    Some(SecretTarget::TemplateEmbed {
                        file: templates_dir.join(SECRET_TEMPLATE_FILE),
                        entry,
                    })
                }
            })
            .collect()
    }

    pub async fn materialize(&self, targets: Vec<SecretTarget>) -> Result<MaterializedSecrets> {
        let mut result = MaterializedSecrets::default();
        let mut templates: Vec<PathBuf> = vec![];
        for target in targets {
            match target {
                SecretTarget::StoreWrite { path, data } => {
                    let Route::Store { store, .. } = &self.route else {
                        return Err(Error::SecretStore {
                            path,
                            source: ApiError::definitive(None, "no secret store configured"),
                        });
                    };
                    store.write(&path, &data).await?;
                    info!("Wrote secret {}", path);
                    result.store_writes += 1;
                }
                SecretTarget::TemplateEmbed { file, entry } => {
                    if !templates.contains(&file) {
                        if write_if_changed(&file, SECRET_TEMPLATE).await? {
                            result.written_files.push(file.clone());
                        }
                        templates.push(file);
                    }
                    result.embedded.push(entry);
                }
            }
        }
        Ok(result)
    }
}
