use std::collections::BTreeMap;

use serde::Serialize;
use tracing::instrument;

use super::http::CurlClient;
use crate::config::HttpSettings;
use crate::config::VaultConfig;
use crate::error::ApiError;
use crate::error::Error;
use crate::error::Result;
use crate::secrets::SecretStore;

/// Writes secrets to a Vault KV v2 mount.
pub struct VaultClient {
    addr: String,
    mount: String,
    http_client: CurlClient,
}

#[derive(Debug, Serialize)]
struct WriteSecret<'a> {
    data: &'a BTreeMap<String, String>,
}

impl VaultClient {
    pub fn new(config: &VaultConfig, settings: HttpSettings) -> Self {
        Self {
            addr: config.addr.clone(),
            mount: config.mount.trim_matches('/').to_string(),
            http_client: CurlClient::new(
                vec![format!("X-Vault-Token: {}", config.token)],
                settings,
            ),
        }
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}/data/{}",
            self.addr,
            self.mount,
            path.trim_matches('/')
        )
    }
}

impl SecretStore for VaultClient {
    #[instrument(skip_all, fields(path = path))]
    async fn write(&self, path: &str, data: &BTreeMap<String, String>) -> Result<()> {
        let json_data = serde_json::to_string(&WriteSecret { data }).map_err(|e| {
            Error::SecretStore {
                path: path.to_string(),
                source: ApiError::definitive(None, e.to_string()),
            }
        })?;
        self.http_client
            .post(&self.data_url(path), &json_data)
            .await
            .map_err(|source| Error::SecretStore {
                path: path.to_string(),
                source,
            })?;
        Ok(())
    }
}
