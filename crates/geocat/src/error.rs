//! Error types for the geocat library.
//!
//! This module provides a unified error type with explicit variants for
//! authentication, transport, HTTP status, cache, batch, transfer,
//! configuration and input validation failures.

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// The unified error type for geocat operations.
///
/// Callers can match on the variant to tell a rejected credential apart from
/// a flaky network or a server-side failure.
#[derive(Debug, Error)]
pub enum Error {
    /// Authentication errors (rejected grants, interactive login failures).
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Network transport errors (connection, timeout), possibly after retries.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Non-success HTTP status from the catalog or storage service.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Token cache read or write failures.
    #[error("token cache error: {0}")]
    Cache(#[from] CacheError),

    /// Batch engine setup failures.
    #[error("batch error: {0}")]
    Batch(#[from] BatchError),

    /// Per-asset transfer failures.
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Configuration loading or validation failures.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input validation errors (URLs, request bodies, identifiers).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),
}

impl Error {
    /// Returns true when retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(err) if err.is_transient())
    }

    /// Returns the HTTP status code if this error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http(err) => Some(err.status),
            Error::Auth(AuthError::GrantRejected { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out: {message}")]
    Timeout { message: String },

    /// Generic HTTP client error (body decoding, redirects, builder).
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// A response body did not have the expected shape.
    #[error("unexpected response body: {message}")]
    Decode { message: String },

    /// A transient failure persisted through every retry attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<TransportError>,
    },
}

impl TransportError {
    /// Connection and timeout failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Connection { .. } | TransportError::Timeout { .. }
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout {
                message: err.to_string(),
            }
        } else if err.is_connect() {
            TransportError::Connection {
                message: err.to_string(),
            }
        } else if err.is_decode() {
            TransportError::Decode {
                message: err.to_string(),
            }
        } else {
            TransportError::Http {
                message: err.to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(TransportError::from(err))
    }
}

/// Authentication-related errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity provider rejected the grant. Never retried.
    #[error("grant rejected by identity provider (HTTP {status}): {message}")]
    GrantRejected { status: u16, message: String },

    /// The token endpoint answered with something that is not a token.
    #[error("invalid token response: {message}")]
    InvalidTokenResponse { message: String },

    /// A refresh was requested but no refresh token is available.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// Refreshing an expired session failed.
    #[error("token refresh failed: {source}")]
    RefreshFailed {
        #[source]
        source: Box<Error>,
    },

    /// Nobody completed the browser login before the listener gave up.
    #[error("Login timed out. If your browser did not open, visit:\n{authorization_url}")]
    LoginTimedOut { authorization_url: String },

    /// The redirect reached the listener without an authorization code.
    #[error("No authorization code found in the login redirect")]
    MissingAuthorizationCode,

    /// The local redirect listener could not be started.
    #[error("callback listener on port {port} failed: {message}")]
    CallbackListener { port: u16, message: String },

    /// An injected session does not carry a usable bearer header.
    #[error("invalid bearer authorization: {reason}")]
    InvalidBearer { reason: String },
}

/// One entry of a structured API error body.
///
/// The service reports failures as `{"errors": [{"message": ..., ...}]}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorDetail {
    pub message: Option<String>,
    pub field: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub source: Option<String>,
    pub trace_id: Option<String>,
}

impl fmt::Display for ApiErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message.as_deref().unwrap_or("Unknown error"))?;

        let extras: Vec<String> = [
            ("field", &self.field),
            ("type", &self.kind),
            ("source", &self.source),
            ("trace_id", &self.trace_id),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_ref().map(|v| format!("{label}: {v}")))
        .collect();

        if !extras.is_empty() {
            write!(f, " ({})", extras.join(", "))?;
        }
        Ok(())
    }
}

/// A non-success HTTP response, wrapped with the request that caused it.
#[derive(Debug, Clone)]
pub struct HttpError {
    /// HTTP method of the failed request.
    pub method: String,
    /// Full URL of the failed request.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: String,
    /// Structured errors parsed from the body, if any.
    pub details: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    errors: Vec<ApiErrorDetail>,
}

impl HttpError {
    /// Create an error from a response status and body, parsing structured
    /// error entries when the body carries them.
    pub fn new(
        method: impl Into<String>,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        let body = body.into();
        let details = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|parsed| parsed.errors)
            .unwrap_or_default();

        Self {
            method: method.into(),
            url: url.into(),
            status,
            body,
            details,
        }
    }

    /// Check if the server rejected the bearer token.
    pub fn is_auth_failure(&self) -> bool {
        self.status == 401 || self.status == 403
    }

    /// Check if the addressed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// A message suitable for showing to a user.
    pub fn human_readable(&self) -> String {
        if self.details.is_empty() {
            format!("HTTP {}: {}", self.status, self.body)
        } else {
            self.details
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HTTP error during {} request to {}: {}",
            self.method,
            self.url,
            self.human_readable()
        )
    }
}

impl std::error::Error for HttpError {}

/// Token cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file could not be read, written or removed.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file exists but is not a token record.
    #[error("{} is not a valid token cache: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Batch engine setup errors. Per-job failures are never reported here.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A worker pool needs at least one slot.
    #[error("max_workers must be at least 1")]
    InvalidWorkerCount,

    /// The job list names the same job twice.
    #[error("duplicate job identifier '{id}'")]
    DuplicateJob { id: String },

    /// A worker panicked while running a job.
    #[error("worker for job '{id}' panicked")]
    WorkerPanicked { id: String },
}

/// Failures tied to a single asset of a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The request for this asset failed.
    #[error("asset '{asset_key}': {source}")]
    Asset {
        asset_key: String,
        #[source]
        source: Box<Error>,
    },

    /// Reading or writing the local file for this asset failed.
    #[error("asset '{asset_key}' ({}): {source}", .path.display())]
    LocalFile {
        asset_key: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The item has no asset under this key.
    #[error("item has no asset '{asset_key}'")]
    UnknownAsset { asset_key: String },

    /// Two assets would be written to the same destination.
    #[error("assets '{first}' and '{second}' both resolve to '{destination}'")]
    DuplicateDestination {
        first: String,
        second: String,
        destination: String,
    },

    /// The item does not exist in the catalog.
    #[error("item '{item_id}' not found in collection '{collection_id}'")]
    ItemNotFound {
        item_id: String,
        collection_id: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field required by the selected authentication type is missing.
    #[error("'{field}' is required for {auth_type} authentication")]
    MissingField {
        field: &'static str,
        auth_type: &'static str,
    },

    /// Unknown authentication type discriminator.
    #[error("unknown authentication type '{value}' (expected 'client-credentials' or 'interactive')")]
    UnknownAuthType { value: String },

    /// No default location for the token cache could be determined.
    #[error("could not determine a home directory for the token cache")]
    NoCacheDir,
}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    /// Invalid service URL format.
    #[error("invalid service URL '{value}': {reason}")]
    ServiceUrl { value: String, reason: String },

    /// A request body could not be serialized.
    #[error("invalid request body: {reason}")]
    Body { reason: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}
