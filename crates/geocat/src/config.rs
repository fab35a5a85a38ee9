//! Configuration loaded from TOML with environment overrides.
//!
//! ```toml
//! [authentication]
//! type = "client-credentials"
//! client_id = "my-client"
//! client_secret = "..."
//!
//! [storage]
//! project_id = "my-project"
//!
//! [client]
//! max_attempts = 3
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::TimeDelta;
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::auth::{
    Authenticator, ClientCredentials, ClientCredentialsAuth, InteractiveAuth, InteractiveSettings,
};
use crate::error::{ConfigError, Error};
use crate::retry::RetryPolicy;
use crate::types::ServiceUrl;

const DEFAULT_TOKEN_URL: &str = "https://login.open-cosmos.com/oauth/token";
const DEFAULT_AUDIENCE: &str = "https://beeapp.open-cosmos.com";
const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://login.open-cosmos.com/authorize";
const DEFAULT_SCOPES: &str = "openid profile email offline_access";
const DEFAULT_CATALOG_URL: &str = "https://app.open-cosmos.com/api/data/v0/stac";
const DEFAULT_STORAGE_URL: &str = "https://app.open-cosmos.com/api/data/v0/storage";

/// Which OAuth2 flow to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    ClientCredentials,
    Interactive,
}

impl AuthKind {
    /// Parse the `type` discriminator, accepting the short aliases.
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "client-credentials" | "client_credentials" | "m2m" => Ok(AuthKind::ClientCredentials),
            "interactive" | "local" => Ok(AuthKind::Interactive),
            _ => Err(ConfigError::UnknownAuthType {
                value: value.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthKind::ClientCredentials => "client-credentials",
            AuthKind::Interactive => "interactive",
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub authentication: AuthenticationConfig,
    pub catalog: CatalogConfig,
    pub storage: StorageConfig,
    pub client: ClientConfig,
}

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthenticationConfig {
    /// `client-credentials` (alias `m2m`) or `interactive` (alias `local`).
    #[serde(rename = "type")]
    pub kind: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub token_url: String,
    pub audience: String,
    pub authorization_endpoint: String,
    pub redirect_port: u16,
    pub scopes: String,
    /// Defaults to `~/.geocat/token_cache.json`.
    pub cache_file: Option<PathBuf>,
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            kind: AuthKind::ClientCredentials.as_str().to_string(),
            client_id: None,
            client_secret: None,
            token_url: DEFAULT_TOKEN_URL.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            authorization_endpoint: DEFAULT_AUTHORIZATION_ENDPOINT.to_string(),
            redirect_port: crate::auth::DEFAULT_REDIRECT_PORT,
            scopes: DEFAULT_SCOPES.to_string(),
            cache_file: None,
        }
    }
}

impl std::fmt::Debug for AuthenticationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationConfig")
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("token_url", &self.token_url)
            .field("audience", &self.audience)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("redirect_port", &self.redirect_port)
            .field("scopes", &self.scopes)
            .field("cache_file", &self.cache_file)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogConfig {
    pub url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CATALOG_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Where objects are written.
    pub url: String,
    /// Where objects are read from; defaults to `url`.
    pub public_url: Option<String>,
    pub project_id: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STORAGE_URL.to_string(),
            public_url: None,
            project_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub skew_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            skew_secs: 30,
            max_attempts: 5,
            backoff_base_ms: 2000,
            backoff_max_ms: 10_000,
            request_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Default config file location: `<config dir>/geocat/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "geocat").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, Error> {
        let config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        Ok(config)
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml_str(&content)
    }

    /// Load a config file, or fall back to defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, Error> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply `GEOCAT_*` overrides read through `lookup`.
    ///
    /// Pass `|name| std::env::var(name).ok()` for the process environment.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let auth = &mut self.authentication;
        if let Some(value) = lookup("GEOCAT_AUTH_TYPE") {
            auth.kind = value;
        }
        if let Some(value) = lookup("GEOCAT_CLIENT_ID") {
            auth.client_id = Some(value);
        }
        if let Some(value) = lookup("GEOCAT_CLIENT_SECRET") {
            auth.client_secret = Some(value);
        }
        if let Some(value) = lookup("GEOCAT_TOKEN_URL") {
            auth.token_url = value;
        }
        if let Some(value) = lookup("GEOCAT_AUDIENCE") {
            auth.audience = value;
        }
        if let Some(value) = lookup("GEOCAT_CACHE_FILE") {
            auth.cache_file = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("GEOCAT_CATALOG_URL") {
            self.catalog.url = value;
        }
        if let Some(value) = lookup("GEOCAT_STORAGE_URL") {
            self.storage.url = value;
        }
        self
    }

    pub fn auth_kind(&self) -> Result<AuthKind, Error> {
        Ok(AuthKind::parse(&self.authentication.kind)?)
    }

    /// Check that the selected flow has what it needs and every URL is usable.
    pub fn validate(&self) -> Result<(), Error> {
        let kind = self.auth_kind()?;
        let auth = &self.authentication;

        if is_blank(&auth.client_id) {
            return Err(missing("client_id", kind));
        }
        if kind == AuthKind::ClientCredentials && is_blank(&auth.client_secret) {
            return Err(missing("client_secret", kind));
        }

        self.token_url()?;
        if kind == AuthKind::Interactive {
            ServiceUrl::new(&auth.authorization_endpoint)?;
        }
        self.catalog_url()?;
        self.storage_url()?;
        self.public_storage_url()?;
        Ok(())
    }

    pub fn catalog_url(&self) -> Result<ServiceUrl, Error> {
        ServiceUrl::new(&self.catalog.url)
    }

    pub fn storage_url(&self) -> Result<ServiceUrl, Error> {
        ServiceUrl::new(&self.storage.url)
    }

    pub fn public_storage_url(&self) -> Result<ServiceUrl, Error> {
        ServiceUrl::new(self.storage.public_url.as_deref().unwrap_or(&self.storage.url))
    }

    pub fn token_url(&self) -> Result<Url, Error> {
        Ok(ServiceUrl::new(&self.authentication.token_url)?.as_url().clone())
    }

    /// The token cache location, explicit or `~/.geocat/token_cache.json`.
    pub fn cache_file(&self) -> Result<PathBuf, Error> {
        if let Some(path) = &self.authentication.cache_file {
            return Ok(path.clone());
        }
        let dirs = BaseDirs::new().ok_or(ConfigError::NoCacheDir)?;
        Ok(dirs.home_dir().join(".geocat").join("token_cache.json"))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.client.max_attempts.max(1),
            Duration::from_millis(self.client.backoff_base_ms),
            Duration::from_millis(self.client.backoff_max_ms),
        )
    }

    pub fn skew(&self) -> TimeDelta {
        i64::try_from(self.client.skew_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.client.request_timeout_secs)
    }

    /// Build the authenticator for the configured flow.
    ///
    /// Validates the configuration first.
    pub fn authenticator(&self, http: reqwest::Client) -> Result<Authenticator, Error> {
        self.validate()?;
        let auth = &self.authentication;
        let client_id = auth.client_id.clone().unwrap_or_default();

        let authenticator = match self.auth_kind()? {
            AuthKind::ClientCredentials => {
                let credentials = ClientCredentials::new(
                    client_id,
                    auth.client_secret.clone().unwrap_or_default(),
                    self.token_url()?,
                    auth.audience.clone(),
                );
                ClientCredentialsAuth::new(http, credentials).into()
            }
            AuthKind::Interactive => {
                let mut settings = InteractiveSettings::new(
                    client_id,
                    ServiceUrl::new(&auth.authorization_endpoint)?.as_url().clone(),
                    self.token_url()?,
                    auth.audience.clone(),
                    self.cache_file()?,
                );
                settings.scopes = auth.scopes.clone();
                settings.redirect_port = auth.redirect_port;
                InteractiveAuth::new(http, settings)
                    .with_skew(self.skew())
                    .into()
            }
        };
        Ok(authenticator)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

fn missing(field: &'static str, kind: AuthKind) -> Error {
    ConfigError::MissingField {
        field,
        auth_type: kind.as_str(),
    }
    .into()
}
