//! Values generation from an app's JSON schema.

use std::sync::LazyLock;

use rand::Rng as _;
use rand::distributions::Alphanumeric;
use regex::Regex;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::error::Error;
use crate::error::Result;

static SECRET_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9-]+").unwrap());

/// Key under which a generated secret's value is stored.
pub const GENERATED_SECRET_KEY: &str = "token";

const SECRET_FORMATS: &[&str] = &["password", "token"];

/// A credential produced while generating values.
///
/// The value never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedSecret {
    pub name: String,
    pub key: String,
    pub value: String,
}

impl std::fmt::Debug for GeneratedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedSecret")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("value", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedValues {
    /// Values payload, as JSON.
    pub values: Value,
    pub secrets: Vec<GeneratedSecret>,
}

/// Produces a values payload and secrets from a values schema.
pub trait ValuesGenerator {
    fn generate(&self, app: &str, schema: &Value) -> Result<GeneratedValues>;
}

/// Non-interactive generation: schema defaults, plus a random secret for
/// every property with a `password` or `token` format.
///
/// A secret property is replaced in the values by `{kind: Secret, name}`.
/// A required property with neither a default nor a secret format is an error.
pub struct SchemaDefaults {
    pub secret_length: usize,
}

impl Default for SchemaDefaults {
    fn default() -> Self {
        Self { secret_length: 20 }
    }
}

impl ValuesGenerator for SchemaDefaults {
    fn generate(&self, app: &str, schema: &Value) -> Result<GeneratedValues> {
        if !schema.is_object() {
            return Err(Error::Schema("schema must be a JSON object".to_string()));
        }
        let mut secrets = vec![];
        let values = self
            .walk(app, &mut vec![], schema, &mut secrets)?
            .unwrap_or_else(|| Value::Object(Map::new()));
        Ok(GeneratedValues { values, secrets })
    }
}

impl SchemaDefaults {
    fn walk(
        &self,
        app: &str,
        path: &mut Vec<String>,
        schema: &Value,
        secrets: &mut Vec<GeneratedSecret>,
    ) -> Result<Option<Value>> {
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            let required: Vec<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            let mut object = Map::new();
            for (name, property) in properties {
                path.push(name.clone());
                match self.walk(app, path, property, secrets)? {
                    Some(value) => {
                        object.insert(name.clone(), value);
                    }
                    None if required.contains(&name.as_str()) => {
                        return Err(Error::Schema(format!(
                            "required property {} has no default",
                            path.join(".")
                        )));
                    }
                    None => {}
                }
                path.pop();
            }
            if object.is_empty() {
                return Ok(schema.get("default").cloned());
            }
            return Ok(Some(Value::Object(object)));
        }

        let format = schema.get("format").and_then(Value::as_str);
        if format.is_some_and(|f| SECRET_FORMATS.contains(&f)) {
            let name = secret_name(app, path);
            secrets.push(GeneratedSecret {
                name: name.clone(),
                key: GENERATED_SECRET_KEY.to_string(),
                value: self.random_value(),
            });
            return Ok(Some(json!({"kind": "Secret", "name": name})));
        }

        Ok(schema.get("default").cloned())
    }

    fn random_value(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.secret_length)
            .map(char::from)
            .collect()
    }
}

fn secret_name(app: &str, path: &[String]) -> String {
    let raw = format!("{}-{}", app, path.join("-")).to_lowercase();
    SECRET_NAME_RE
        .replace_all(&raw, "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Value {
        json!({
            "type": "object",
            "required": ["replicas"],
            "properties": {
                "replicas": {"type": "integer", "default": 2},
                "ingress": {
                    "type": "object",
                    "properties": {
                        "enabled": {"type": "boolean", "default": false},
                        "host": {"type": "string"}
                    }
                },
                "adminPassword": {"type": "string", "format": "password"},
                "empty": {"type": "object", "properties": {"x": {"type": "string"}}}
            }
        })
    }

    #[test]
    fn test_defaults_and_secrets() {
        let generated = SchemaDefaults::default().generate("nginx", &schema()).unwrap();
        assert_eq!(
            generated.values,
            json!({
                "replicas": 2,
                "ingress": {"enabled": false},
                "adminPassword": {"kind": "Secret", "name": "nginx-adminpassword"}
            })
        );
        assert_eq!(generated.secrets.len(), 1);
        let secret = &generated.secrets[0];
        assert_eq!(secret.name, "nginx-adminpassword");
        assert_eq!(secret.key, GENERATED_SECRET_KEY);
        assert_eq!(secret.value.len(), 20);
        assert!(secret.value.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_required_without_default_fails() {
        let schema = json!({
            "properties": {"db": {"properties": {"url": {"type": "string"}}, "required": ["url"]}}
        });
        let err = SchemaDefaults::default().generate("app", &schema).unwrap_err();
        assert_eq!(
            err.to_string(),
            "values schema: required property db.url has no default"
        );
    }

    #[test]
    fn test_non_object_schema_fails() {
        assert!(matches!(
            SchemaDefaults::default().generate("app", &json!(["nope"])),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = GeneratedSecret {
            name: "a".to_string(),
            key: "token".to_string(),
            value: "hunter2".to_string(),
        };
        assert!(!format!("{secret:?}").contains("hunter2"));
    }

    #[test]
    fn test_secret_name() {
        assert_eq!(
            secret_name("My_App", &["db".to_string(), "Password".to_string()]),
            "my-app-db-password"
        );
    }
}
