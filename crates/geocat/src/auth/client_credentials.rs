//! Client-credentials (machine-to-machine) flow.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::error::Error;
use crate::retry::RetryPolicy;

use super::Authenticated;
use super::clock::{Clock, SystemClock};
use super::credentials::ClientCredentials;
use super::grant;
use super::session::HttpSession;
use super::tokens::{DEFAULT_GRANT_LIFETIME, Token};

/// Authenticates with a client id and secret.
///
/// There is no refresh token in this flow; refreshing re-runs the grant.
/// Tokens are kept in memory only.
#[derive(Debug, Clone)]
pub struct ClientCredentialsAuth {
    http: reqwest::Client,
    credentials: ClientCredentials,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl ClientCredentialsAuth {
    /// Create the authenticator with the token endpoint retry policy.
    pub fn new(http: reqwest::Client, credentials: ClientCredentials) -> Self {
        Self {
            http,
            credentials,
            retry: RetryPolicy::token_endpoint(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the retry policy for connection and timeout failures.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the clock used to turn `expires_in` into an absolute time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The credentials this authenticator presents.
    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    /// Run the client-credentials grant.
    ///
    /// Connection errors and timeouts are retried with backoff; a rejected
    /// grant fails on the first attempt.
    #[instrument(skip(self), fields(client_id = %self.credentials.client_id()))]
    pub async fn authenticate(&self) -> Result<Authenticated, Error> {
        info!("Requesting client-credentials token");

        let creds = &self.credentials;
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", creds.client_id()),
            ("client_secret", creds.client_secret()),
            ("audience", creds.audience()),
        ];

        let http = &self.http;
        let form = &form;
        let response = self
            .retry
            .run("client credentials grant", move || {
                grant::request_token(http, creds.token_url(), form)
            })
            .await?;

        let token = Token::from_grant_response(response, self.clock.now(), DEFAULT_GRANT_LIFETIME)?;
        Ok(Authenticated {
            session: HttpSession::new(self.http.clone(), token.access_token().clone()),
            token,
        })
    }

    /// Same as [`authenticate`](Self::authenticate).
    pub async fn refresh(&self) -> Result<Authenticated, Error> {
        self.authenticate().await
    }
}
