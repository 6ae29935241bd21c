//! Configuration module
//!
//! Storage configuration is read from environment variables (a `.env` file is
//! loaded first when present). Each backend also has a plain config struct so
//! it can be constructed directly.

use std::env;
use std::path::PathBuf;

use base64::Engine;

use crate::storage_types::StorageBackend;

const DEFAULT_LOCAL_URL_PREFIX: &str = "/blobs";
const MIN_SIGNING_SECRET_LEN: usize = 32;

/// Local filesystem backend settings
#[derive(Clone, Debug)]
pub struct DiskConfig {
    /// Root directory blobs are stored under
    pub root: PathBuf,
    /// Prefix of the routes that redeem signed blob tokens (e.g. "/blobs")
    pub url_prefix: String,
    /// Secret used to sign blob tokens
    pub signing_secret: String,
}

/// Azure Blob Storage backend settings
#[derive(Clone)]
pub struct AzureConfig {
    /// Base URL of the blob service, e.g. "https://myaccount.blob.core.windows.net"
    pub path: String,
    pub storage_account_name: String,
    /// Base64-encoded account key
    pub storage_access_key: String,
    pub container: String,
}

// The access key must never end up in logs.
impl std::fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureConfig")
            .field("path", &self.path)
            .field("storage_account_name", &self.storage_account_name)
            .field("storage_access_key", &"<redacted>")
            .field("container", &self.container)
            .finish()
    }
}

/// Storage configuration
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub storage_backend: StorageBackend,
    pub disk: Option<DiskConfig>,
    pub azure: Option<AzureConfig>,
}

impl StorageConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let storage_backend = match var("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::Local,
        };

        let disk = var("LOCAL_STORAGE_ROOT").map(|root| DiskConfig {
            root: PathBuf::from(root),
            url_prefix: var("LOCAL_STORAGE_URL_PREFIX")
                .unwrap_or_else(|| DEFAULT_LOCAL_URL_PREFIX.to_string()),
            signing_secret: var("STORAGE_SIGNING_SECRET").unwrap_or_default(),
        });

        let azure = match (
            var("AZURE_STORAGE_ACCOUNT_NAME"),
            var("AZURE_STORAGE_ACCESS_KEY"),
            var("AZURE_STORAGE_CONTAINER"),
        ) {
            (Some(account), Some(access_key), Some(container)) => Some(AzureConfig {
                path: var("AZURE_STORAGE_PATH")
                    .unwrap_or_else(|| format!("https://{}.blob.core.windows.net", account)),
                storage_account_name: account,
                storage_access_key: access_key,
                container,
            }),
            _ => None,
        };

        let config = StorageConfig {
            storage_backend,
            disk,
            azure,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match self.storage_backend {
            StorageBackend::Local => {
                let disk = self.disk.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("LOCAL_STORAGE_ROOT must be set when using local storage backend")
                })?;
                disk.validate()
            }
            StorageBackend::Azure => {
                let azure = self.azure.as_ref().ok_or_else(|| {
                    anyhow::anyhow!(
                        "AZURE_STORAGE_ACCOUNT_NAME, AZURE_STORAGE_ACCESS_KEY and AZURE_STORAGE_CONTAINER must be set when using azure storage backend"
                    )
                })?;
                azure.validate()
            }
        }
    }
}

impl DiskConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.signing_secret.len() < MIN_SIGNING_SECRET_LEN {
            return Err(anyhow::anyhow!(
                "STORAGE_SIGNING_SECRET must be at least {} characters long",
                MIN_SIGNING_SECRET_LEN
            ));
        }
        Ok(())
    }
}

impl AzureConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.path.starts_with("https://") || self.path.starts_with("http://")) {
            return Err(anyhow::anyhow!(
                "AZURE_STORAGE_PATH must be an http(s) URL, got {}",
                self.path
            ));
        }
        base64::engine::general_purpose::STANDARD
            .decode(&self.storage_access_key)
            .map_err(|_| anyhow::anyhow!("AZURE_STORAGE_ACCESS_KEY must be valid base64"))?;
        if self.container.contains('/') {
            return Err(anyhow::anyhow!(
                "AZURE_STORAGE_CONTAINER must be a bare container name"
            ));
        }
        Ok(())
    }
}
