//! Authentication: tokens, the token cache, and the two OAuth2 flows.
//!
//! Callers pick a flow once by constructing an [`Authenticator`]; the
//! resilient client then drives it through `authenticate()` and `refresh()`
//! without looking at which variant it holds.

mod browser;
mod cache;
mod callback;
mod client_credentials;
mod clock;
mod credentials;
mod grant;
mod interactive;
mod session;
mod tokens;

pub use browser::{BrowserLauncher, SystemBrowser};
pub use cache::TokenCache;
pub use client_credentials::ClientCredentialsAuth;
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{
    ClientCredentials, DEFAULT_LOGIN_TIMEOUT, DEFAULT_REDIRECT_PORT, InteractiveSettings,
};
pub use interactive::{DEFAULT_SKEW, InteractiveAuth};
pub use session::{HttpSession, http_client};
pub use tokens::{AccessToken, RefreshToken, Token};

use crate::error::Error;

/// A fresh token and the session authorized with it.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub session: HttpSession,
    pub token: Token,
}

/// The configured OAuth2 flow.
#[derive(Debug, Clone)]
pub enum Authenticator {
    /// Machine-to-machine client-credentials grant.
    ClientCredentials(ClientCredentialsAuth),
    /// Browser-based authorization-code grant with a token cache.
    Interactive(InteractiveAuth),
}

impl Authenticator {
    /// Obtain a token, reusing cached state where the flow has any.
    pub async fn authenticate(&self) -> Result<Authenticated, Error> {
        match self {
            Authenticator::ClientCredentials(auth) => auth.authenticate().await,
            Authenticator::Interactive(auth) => auth.authenticate().await,
        }
    }

    /// Obtain a new token, bypassing any cached one.
    pub async fn refresh(&self) -> Result<Authenticated, Error> {
        match self {
            Authenticator::ClientCredentials(auth) => auth.refresh().await,
            Authenticator::Interactive(auth) => auth.refresh().await,
        }
    }

    /// Short name of the flow, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Authenticator::ClientCredentials(_) => "client-credentials",
            Authenticator::Interactive(_) => "interactive",
        }
    }
}

impl From<ClientCredentialsAuth> for Authenticator {
    fn from(auth: ClientCredentialsAuth) -> Self {
        Authenticator::ClientCredentials(auth)
    }
}

impl From<InteractiveAuth> for Authenticator {
    fn from(auth: InteractiveAuth) -> Self {
        Authenticator::Interactive(auth)
    }
}
