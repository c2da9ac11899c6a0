use super::{Credentials, SecretStore};
use crate::config::VaultConfig;
use crate::error::WarehouseError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Vault KV v2 client. Each operation is a single request/response.
#[derive(Clone)]
pub struct VaultClient {
    client: reqwest::Client,
    addr: Url,
    token: String,
    mount: String,
}

#[derive(Deserialize)]
struct KvReadResponse {
    data: KvReadData,
}

#[derive(Deserialize)]
struct KvReadData {
    data: Credentials,
}

#[derive(Serialize)]
struct KvWriteRequest<'a> {
    data: &'a Credentials,
}

impl VaultClient {
    pub fn new(cfg: &VaultConfig) -> Result<Self, WarehouseError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("cryoet-db/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self::with_client(client, cfg)?)
    }

    pub fn with_client(client: reqwest::Client, cfg: &VaultConfig) -> Result<Self, url::ParseError> {
        // Url::join drops the last path segment unless it ends with '/'.
        let mut addr = cfg.addr.clone();
        if !addr.ends_with('/') {
            addr.push('/');
        }
        Ok(Self {
            client,
            addr: Url::parse(&addr)?,
            token: cfg.token.clone(),
            mount: cfg.mount.trim_matches('/').to_string(),
        })
    }

    fn health_url(&self) -> Result<Url, url::ParseError> {
        self.addr.join("v1/sys/health")
    }

    fn secret_url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.addr.join(&format!(
            "v1/{}/data/{}",
            self.mount,
            path.trim_start_matches('/')
        ))
    }
}

impl SecretStore for VaultClient {
    async fn is_healthy(&self) -> Result<bool, WarehouseError> {
        let resp = self.client.get(self.health_url()?).send().await?;
        debug!(status = %resp.status(), "vault health status");
        Ok(resp.status().is_success())
    }

    async fn read_credentials(&self, path: &str) -> Result<Option<Credentials>, WarehouseError> {
        let resp = self
            .client
            .get(self.secret_url(path)?)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                // A document missing a credential key is a Json error, not a transport one.
                let body: KvReadResponse = serde_json::from_slice(&resp.bytes().await?)?;
                Ok(Some(body.data.data))
            }
            status => Err(WarehouseError::SecretRead {
                path: path.to_string(),
                status,
            }),
        }
    }

    async fn write_credentials(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> Result<(), WarehouseError> {
        let write_err = |reason: String| WarehouseError::SecretWrite {
            path: path.to_string(),
            reason,
        };

        let resp = self
            .client
            .post(self.secret_url(path)?)
            .header(TOKEN_HEADER, &self.token)
            .json(&KvWriteRequest { data: credentials })
            .send()
            .await
            .map_err(|e| write_err(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(write_err(format!("upstream status {}", resp.status())));
        }
        Ok(())
    }
}
