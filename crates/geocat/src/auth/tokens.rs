//! Token types for OAuth2 bearer authentication.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::error::{AuthError, Error};

/// An access token sent as `Authorization: Bearer <token>`.
///
/// # Security
///
/// - Never logged or displayed in Debug output
/// - Treat as opaque; only the `exp` claim is ever inspected
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(pub(crate) String);

impl AccessToken {
    /// Create a new access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token value for use in authorization headers.
    ///
    /// # Security
    ///
    /// Use only when constructing HTTP authorization headers or the cache record.
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads the `exp` claim if the token is a JWT.
    ///
    /// Returns `None` for opaque tokens or malformed payloads.
    pub fn jwt_expiry(&self) -> Option<DateTime<Utc>> {
        #[derive(Deserialize)]
        struct Claims {
            exp: Option<f64>,
        }

        let payload = self.0.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        let claims: Claims = serde_json::from_slice(&bytes).ok()?;
        DateTime::from_timestamp(claims.exp? as i64, 0)
    }
}

// Hide token value in Debug output
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessToken").field(&"[REDACTED]").finish()
    }
}

/// A refresh token for obtaining new access tokens without a browser login.
///
/// # Security
///
/// - Never logged or displayed in Debug output
/// - Treat as opaque
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken(pub(crate) String);

impl RefreshToken {
    /// Create a new refresh token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token value for use in refresh requests.
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

// Hide token value in Debug output
impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefreshToken").field(&"[REDACTED]").finish()
    }
}

/// A bearer token with its absolute expiry.
///
/// Tokens are never mutated; a refresh produces a new `Token`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    access_token: AccessToken,
    refresh_token: Option<RefreshToken>,
    expires_at: DateTime<Utc>,
}

/// Lifetime assumed when a token response carries no expiry at all.
pub(crate) const FALLBACK_LIFETIME: TimeDelta = TimeDelta::seconds(300);

/// Lifetime assumed for grants that omit `expires_in`.
pub(crate) const DEFAULT_GRANT_LIFETIME: TimeDelta = TimeDelta::seconds(3600);

impl Token {
    /// Create a token from its parts.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: AccessToken::new(access_token),
            refresh_token: refresh_token.map(RefreshToken::new),
            expires_at,
        }
    }

    /// The bearer credential.
    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    /// The refresh credential, if the grant issued one.
    pub fn refresh_token(&self) -> Option<&RefreshToken> {
        self.refresh_token.as_ref()
    }

    /// Absolute expiry time.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True when `expires_at - now <= skew`. Exactly at the skew boundary
    /// counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>, skew: TimeDelta) -> bool {
        self.expires_at - now <= skew
    }

    /// Returns a copy carrying `refresh_token` when this token has none.
    pub(crate) fn or_refresh_token(mut self, refresh_token: Option<&RefreshToken>) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = refresh_token.cloned();
        }
        self
    }

    /// Build a token from a token-endpoint response.
    ///
    /// The expiry is taken from `expires_at`, then `expires_in`, then the JWT
    /// `exp` claim, and finally `fallback` from now.
    pub(crate) fn from_grant_response(
        response: GrantResponse,
        now: DateTime<Utc>,
        fallback: TimeDelta,
    ) -> Result<Self, Error> {
        if response.access_token.is_empty() {
            return Err(AuthError::InvalidTokenResponse {
                message: "empty access_token".to_string(),
            }
            .into());
        }

        let access_token = AccessToken::new(response.access_token);

        let expires_at = response
            .expires_at
            .and_then(|at| DateTime::from_timestamp(at as i64, 0))
            .or_else(|| {
                response
                    .expires_in
                    .and_then(|secs| TimeDelta::try_seconds(secs as i64))
                    .map(|lifetime| now + lifetime)
            })
            .or_else(|| access_token.jwt_expiry())
            .unwrap_or(now + fallback);

        Ok(Self {
            access_token,
            refresh_token: response.refresh_token.map(RefreshToken::new),
            expires_at,
        })
    }
}

/// Response body of an OAuth2 token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct GrantResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<f64>,
    #[serde(default)]
    pub expires_at: Option<f64>,
}
