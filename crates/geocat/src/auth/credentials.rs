//! Credentials for the two OAuth2 flows.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Machine-to-machine credentials for the client-credentials grant.
///
/// # Security
///
/// The secret is never displayed in Debug output.
#[derive(Clone)]
pub struct ClientCredentials {
    client_id: String,
    client_secret: String,
    token_url: Url,
    audience: String,
}

impl ClientCredentials {
    /// Create client credentials for `token_url`.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: Url,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url,
            audience: audience.into(),
        }
    }

    /// Returns the client identifier.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the token endpoint.
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Returns the API audience.
    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub(crate) fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("token_url", &self.token_url.as_str())
            .field("audience", &self.audience)
            .finish()
    }
}

/// How long the redirect listener waits for the browser by default.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Default port of the local redirect listener.
pub const DEFAULT_REDIRECT_PORT: u16 = 8765;

/// Settings for the interactive authorization-code flow.
#[derive(Debug, Clone)]
pub struct InteractiveSettings {
    /// Public client identifier.
    pub client_id: String,
    /// Provider authorization endpoint the browser is sent to.
    pub authorization_endpoint: Url,
    /// Token endpoint for code exchange and refresh.
    pub token_url: Url,
    /// API audience.
    pub audience: String,
    /// Space-separated scopes.
    pub scopes: String,
    /// Port of the local redirect listener. `0` picks a free port.
    pub redirect_port: u16,
    /// Location of the token cache file.
    pub cache_file: PathBuf,
    /// How long to wait for the browser redirect.
    pub login_timeout: Duration,
}

impl InteractiveSettings {
    /// Settings with the default scopes, port and login timeout.
    pub fn new(
        client_id: impl Into<String>,
        authorization_endpoint: Url,
        token_url: Url,
        audience: impl Into<String>,
        cache_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            authorization_endpoint,
            token_url,
            audience: audience.into(),
            scopes: "openid profile email offline_access".to_string(),
            redirect_port: DEFAULT_REDIRECT_PORT,
            cache_file: cache_file.into(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_secret() {
        let creds = ClientCredentials::new(
            "client-1",
            "super-secret-value",
            Url::parse("https://login.example.com/oauth/token").unwrap(),
            "https://api.example.com",
        );
        let debug = format!("{:?}", creds);
        assert!(debug.contains("client-1"));
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("[REDACTED]"));
    }
}
