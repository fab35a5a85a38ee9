//! HTTP transport bound to a bearer token.

use std::fmt;
use std::time::Duration;

use reqwest::header::HeaderValue;
use reqwest::{Method, RequestBuilder};
use url::Url;

use crate::error::{AuthError, Error};

use super::tokens::AccessToken;

/// Build the HTTP client used for every call made by this crate.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, Error> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("geocat/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// An HTTP client paired with the bearer token it authorizes requests with.
///
/// Sessions are cheap to clone. Refreshing produces a new session rather
/// than changing this one.
#[derive(Clone)]
pub struct HttpSession {
    client: reqwest::Client,
    bearer: AccessToken,
}

impl HttpSession {
    /// Bind `client` to `bearer`.
    pub fn new(client: reqwest::Client, bearer: AccessToken) -> Self {
        Self { client, bearer }
    }

    /// Adopt a session authorized elsewhere from its `Authorization` header.
    ///
    /// # Errors
    ///
    /// Fails unless the value has the form `Bearer <token>`.
    pub fn from_authorization(client: reqwest::Client, authorization: &str) -> Result<Self, Error> {
        let token = authorization
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::InvalidBearer {
                reason: "expected 'Bearer <token>'".to_string(),
            })?;

        if HeaderValue::from_str(&format!("Bearer {token}")).is_err() {
            return Err(AuthError::InvalidBearer {
                reason: "token contains characters not allowed in a header".to_string(),
            }
            .into());
        }

        Ok(Self::new(client, AccessToken::new(token)))
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The bearer token this session sends.
    pub fn bearer(&self) -> &AccessToken {
        &self.bearer
    }

    /// Start an authorized request.
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(self.bearer.as_str())
    }
}

impl fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSession")
            .field("bearer", &self.bearer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_is_parsed() {
        let session = HttpSession::from_authorization(reqwest::Client::new(), "Bearer abc.def").unwrap();
        assert_eq!(session.bearer().as_str(), "abc.def");
    }

    #[test]
    fn non_bearer_header_is_rejected() {
        assert!(HttpSession::from_authorization(reqwest::Client::new(), "Basic dXNlcg==").is_err());
        assert!(HttpSession::from_authorization(reqwest::Client::new(), "Bearer ").is_err());
    }

    #[test]
    fn debug_hides_bearer() {
        let session = HttpSession::new(reqwest::Client::new(), AccessToken::new("secret-token"));
        assert!(!format!("{:?}", session).contains("secret-token"));
    }
}
