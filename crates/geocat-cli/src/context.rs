//! Configuration loading and client construction shared by commands.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use geocat::auth::http_client;
use geocat::{CatalogClient, Config, ResilientClient, StorageClient};
use tracing::debug;

/// Everything a command needs to talk to the services.
pub struct Context {
    pub config: Config,
    pub config_path: Option<PathBuf>,
}

impl Context {
    /// Load the config from `path`, or from the default location.
    ///
    /// An explicit path must exist; the default one may be missing.
    /// `GEOCAT_*` environment variables override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config, config_path) = match path {
            Some(path) => {
                let config = Config::load(path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?;
                (config, Some(path.to_path_buf()))
            }
            None => match Config::default_path() {
                Some(path) => {
                    let config = Config::load_or_default(&path).with_context(|| {
                        format!("Failed to load config from {}", path.display())
                    })?;
                    (config, Some(path))
                }
                None => (Config::default(), None),
            },
        };

        let config = config.apply_env(|name| std::env::var(name).ok());
        debug!(
            config = ?config_path,
            auth_type = %config.authentication.kind,
            catalog = %config.catalog.url,
            "Configuration loaded"
        );
        Ok(Self {
            config,
            config_path,
        })
    }

    /// Authenticate with the configured flow.
    pub async fn client(&self) -> Result<ResilientClient> {
        let http = http_client(self.config.request_timeout())?;
        let authenticator = self
            .config
            .authenticator(http)
            .context("Invalid authentication settings")?;

        ResilientClient::builder()
            .retry_policy(self.config.retry_policy())
            .skew(self.config.skew())
            .authenticate(authenticator)
            .await
            .context("Authentication failed")
    }

    pub async fn catalog(&self) -> Result<CatalogClient> {
        let client = self.client().await?;
        Ok(CatalogClient::new(client, self.config.catalog_url()?))
    }

    pub async fn storage(&self) -> Result<StorageClient> {
        let catalog = self.catalog().await?;
        let storage = StorageClient::new(
            catalog.client().clone(),
            self.config.storage_url()?,
            self.config.public_storage_url()?,
            catalog,
        );
        Ok(match &self.config.storage.project_id {
            Some(project_id) => storage.with_project_id(project_id),
            None => storage,
        })
    }
}
