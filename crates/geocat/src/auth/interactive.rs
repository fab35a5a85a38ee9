//! Interactive authorization-code flow with an on-disk token cache.

use std::fmt;
use std::sync::Arc;

use chrono::TimeDelta;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{AuthError, Error};

use super::Authenticated;
use super::browser::{BrowserLauncher, SystemBrowser};
use super::cache::TokenCache;
use super::callback::{CALLBACK_PATH, CallbackListener, CallbackOutcome};
use super::clock::{Clock, SystemClock};
use super::credentials::InteractiveSettings;
use super::grant;
use super::session::HttpSession;
use super::tokens::{DEFAULT_GRANT_LIFETIME, FALLBACK_LIFETIME, Token};

/// Default margin before expiry at which a cached token is not reused.
pub const DEFAULT_SKEW: TimeDelta = TimeDelta::seconds(30);

/// Authenticates a person through their browser.
///
/// The first call tries, in order: the cached token, a refresh-token grant,
/// and finally a browser login with a local redirect listener. Every token
/// obtained over the network is written back to the cache.
#[derive(Clone)]
pub struct InteractiveAuth {
    http: reqwest::Client,
    settings: InteractiveSettings,
    cache: TokenCache,
    browser: Arc<dyn BrowserLauncher>,
    clock: Arc<dyn Clock>,
    skew: TimeDelta,
}

impl InteractiveAuth {
    /// Create the authenticator. The cache file lives at `settings.cache_file`.
    pub fn new(http: reqwest::Client, settings: InteractiveSettings) -> Self {
        let cache = TokenCache::new(settings.cache_file.clone());
        Self {
            http,
            settings,
            cache,
            browser: Arc::new(SystemBrowser),
            clock: Arc::new(SystemClock),
            skew: DEFAULT_SKEW,
        }
    }

    /// Replace how the authorization URL is shown to the user.
    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    /// Replace the clock used for expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the expiry margin for cached tokens.
    pub fn with_skew(mut self, skew: TimeDelta) -> Self {
        self.skew = skew;
        self
    }

    /// The token cache this authenticator reads and writes.
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// The flow settings.
    pub fn settings(&self) -> &InteractiveSettings {
        &self.settings
    }

    /// Obtain a token, preferring the cache.
    ///
    /// An unexpired cached token is returned without any network call.
    #[instrument(skip(self), fields(client_id = %self.settings.client_id))]
    pub async fn authenticate(&self) -> Result<Authenticated, Error> {
        let cached = self.load_cached().await;

        if let Some(token) = &cached {
            if !token.is_expired(self.clock.now(), self.skew) {
                debug!(expires_at = %token.expires_at(), "Using cached token");
                return Ok(self.authenticated(token.clone()));
            }
            debug!("Cached token expired");
        }

        self.renew(cached).await
    }

    /// Obtain a new token even if the cached one is still valid.
    ///
    /// Uses the cached refresh token when there is one and falls back to a
    /// browser login when the refresh grant fails.
    #[instrument(skip(self), fields(client_id = %self.settings.client_id))]
    pub async fn refresh(&self) -> Result<Authenticated, Error> {
        let cached = self.load_cached().await;
        self.renew(cached).await
    }

    /// Forget the cached token.
    pub async fn logout(&self) -> Result<(), Error> {
        info!("Clearing token cache");
        self.cache.clear().await
    }

    async fn renew(&self, cached: Option<Token>) -> Result<Authenticated, Error> {
        if let Some(token) = cached {
            match self.refresh_grant(&token).await {
                Ok(fresh) => {
                    self.cache.save(&fresh).await?;
                    return Ok(self.authenticated(fresh));
                }
                Err(e) => {
                    warn!(error = %e, "Token refresh failed, falling back to browser login");
                }
            }
        }

        let token = self.browser_login().await?;
        self.cache.save(&token).await?;
        Ok(self.authenticated(token))
    }

    async fn load_cached(&self) -> Option<Token> {
        match self.cache.load().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable token cache");
                None
            }
        }
    }

    async fn refresh_grant(&self, token: &Token) -> Result<Token, Error> {
        let refresh_token = token.refresh_token().ok_or(AuthError::MissingRefreshToken)?;
        info!("Refreshing token");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.settings.client_id.as_str()),
            ("audience", self.settings.audience.as_str()),
        ];
        let response = grant::request_token(&self.http, &self.settings.token_url, &form).await?;

        // Providers that do not rotate refresh tokens omit them here.
        Ok(
            Token::from_grant_response(response, self.clock.now(), DEFAULT_GRANT_LIFETIME)?
                .or_refresh_token(Some(refresh_token)),
        )
    }

    async fn browser_login(&self) -> Result<Token, Error> {
        let listener = CallbackListener::bind(self.settings.redirect_port).await?;
        let redirect_uri = format!("http://localhost:{}{}", listener.port(), CALLBACK_PATH);
        let authorization_url = self.authorization_url(&redirect_uri);

        info!("Opening browser for login");
        if let Err(e) = self.browser.open(authorization_url.as_str()) {
            warn!(
                error = %e,
                url = %authorization_url,
                "Could not open a browser, visit the URL manually"
            );
        }

        let code = match listener.wait_for_code(self.settings.login_timeout).await {
            CallbackOutcome::Code(code) => code,
            CallbackOutcome::MissingCode => return Err(AuthError::MissingAuthorizationCode.into()),
            CallbackOutcome::TimedOut => {
                return Err(AuthError::LoginTimedOut {
                    authorization_url: authorization_url.to_string(),
                }
                .into());
            }
        };

        debug!("Exchanging authorization code");
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", self.settings.client_id.as_str()),
            ("audience", self.settings.audience.as_str()),
        ];
        let response = grant::request_token(&self.http, &self.settings.token_url, &form).await?;
        Token::from_grant_response(response, self.clock.now(), FALLBACK_LIFETIME)
    }

    fn authorization_url(&self, redirect_uri: &str) -> Url {
        let mut url = self.settings.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("audience", &self.settings.audience)
            .append_pair("scope", &self.settings.scopes);
        url
    }

    fn authenticated(&self, token: Token) -> Authenticated {
        Authenticated {
            session: HttpSession::new(self.http.clone(), token.access_token().clone()),
            token,
        }
    }
}

impl fmt::Debug for InteractiveAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractiveAuth")
            .field("settings", &self.settings)
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_url_carries_flow_parameters() {
        let settings = InteractiveSettings::new(
            "cli-app",
            Url::parse("https://login.example.com/authorize").unwrap(),
            Url::parse("https://login.example.com/oauth/token").unwrap(),
            "https://api.example.com",
            "/tmp/unused.json",
        );
        let auth = InteractiveAuth::new(reqwest::Client::new(), settings);

        let url = auth.authorization_url("http://localhost:8765/oauth/callback");
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(params["client_id"], "cli-app");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["redirect_uri"], "http://localhost:8765/oauth/callback");
        assert_eq!(params["audience"], "https://api.example.com");
        assert_eq!(params["scope"], "openid profile email offline_access");
    }
}
