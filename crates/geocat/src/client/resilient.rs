//! The resilient, self-refreshing HTTP client.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use crate::auth::{Authenticated, Authenticator, Clock, DEFAULT_SKEW, HttpSession, SystemClock};
use crate::error::{AuthError, Error, HttpError, TransportError};
use crate::retry::RetryPolicy;

use super::hooks::{
    RequestHook, RequestInfo, ResponseHook, fire_request_hooks, fire_response_hooks,
};
use super::request::RequestOptions;

/// An authenticated HTTP client that keeps its bearer token valid.
///
/// Before every request the client checks the token expiry and refreshes
/// it if needed. Connection failures and timeouts are retried with backoff.
/// A 401 or 403 on an owned session triggers one forced refresh and one
/// retry of the same request.
///
/// # Thread Safety
///
/// Clients are cheap to clone (they use internal `Arc`) and are safe to
/// share across tasks. At most one refresh runs at a time per client;
/// callers that lose the race reuse the winner's token.
///
/// # Example
///
/// ```no_run
/// use geocat::auth::{ClientCredentials, ClientCredentialsAuth, http_client};
/// use geocat::client::{RequestOptions, ResilientClient};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), geocat::Error> {
/// let http = http_client(Duration::from_secs(60))?;
/// let creds = ClientCredentials::new(
///     "client-id",
///     "client-secret",
///     "https://login.example.com/oauth/token".parse().unwrap(),
///     "https://api.example.com",
/// );
/// let client = ResilientClient::builder()
///     .authenticate(ClientCredentialsAuth::new(http, creds).into())
///     .await?;
///
/// let response = client
///     .get("https://api.example.com/stac/collections".parse().unwrap(), RequestOptions::new())
///     .await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ResilientClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    /// `None` for injected sessions, which are never refreshed here.
    authenticator: Option<Authenticator>,
    state: RwLock<AuthState>,
    refresh_lock: Mutex<()>,
    request_hooks: Vec<RequestHook>,
    response_hooks: Vec<ResponseHook>,
    retry: RetryPolicy,
    skew: TimeDelta,
    clock: Arc<dyn Clock>,
}

#[derive(Clone)]
struct AuthState {
    session: HttpSession,
    expires_at: Option<DateTime<Utc>>,
    /// Bumped on every refresh, so a caller can tell whether the token it
    /// used is still current.
    generation: u64,
}

/// Configures and creates a [`ResilientClient`].
pub struct ClientBuilder {
    request_hooks: Vec<RequestHook>,
    response_hooks: Vec<ResponseHook>,
    retry: RetryPolicy,
    skew: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            request_hooks: Vec::new(),
            response_hooks: Vec::new(),
            retry: RetryPolicy::requests(),
            skew: DEFAULT_SKEW,
            clock: Arc::new(SystemClock),
        }
    }
}

impl ClientBuilder {
    /// Register a hook called before every request.
    pub fn request_hook(mut self, hook: RequestHook) -> Self {
        self.request_hooks.push(hook);
        self
    }

    /// Register a hook called with every successful response.
    pub fn response_hook(mut self, hook: ResponseHook) -> Self {
        self.response_hooks.push(hook);
        self
    }

    /// Retry policy for connection failures and timeouts.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Refresh this long before the token expires.
    pub fn skew(mut self, skew: TimeDelta) -> Self {
        self.skew = skew;
        self
    }

    /// Clock used for expiry checks.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Authenticate once and return a client that owns its session.
    #[instrument(skip_all, fields(flow = authenticator.kind()))]
    pub async fn authenticate(self, authenticator: Authenticator) -> Result<ResilientClient, Error> {
        let Authenticated { session, token } = authenticator.authenticate().await?;
        info!(expires_at = %token.expires_at(), "Authenticated");

        Ok(self.finish(
            Some(authenticator),
            AuthState {
                session,
                expires_at: Some(token.expires_at()),
                generation: 0,
            },
        ))
    }

    /// Wrap a session authorized elsewhere.
    ///
    /// The client never refreshes or re-authenticates such a session. The
    /// expiry is read from the token's JWT `exp` claim when present and kept
    /// for bookkeeping only.
    pub fn with_session(self, session: HttpSession) -> ResilientClient {
        let expires_at = session.bearer().jwt_expiry();
        self.finish(
            None,
            AuthState {
                session,
                expires_at,
                generation: 0,
            },
        )
    }

    fn finish(self, authenticator: Option<Authenticator>, state: AuthState) -> ResilientClient {
        ResilientClient {
            inner: Arc::new(ClientInner {
                authenticator,
                state: RwLock::new(state),
                refresh_lock: Mutex::new(()),
                request_hooks: self.request_hooks,
                response_hooks: self.response_hooks,
                retry: self.retry,
                skew: self.skew,
                clock: self.clock,
            }),
        }
    }
}

impl ResilientClient {
    /// Start configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// True when this client authenticated itself and may refresh.
    pub fn owns_session(&self) -> bool {
        self.inner.authenticator.is_some()
    }

    /// Expiry of the current token, if known.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.inner.state.read().await.expires_at
    }

    /// Whether the next request would refresh first.
    ///
    /// Always false for injected sessions.
    pub async fn needs_refresh(&self) -> bool {
        let state = self.inner.state.read().await;
        self.state_needs_refresh(&state)
    }

    /// Send `method url` with `options`.
    ///
    /// Returns the response for any status below 400. Other statuses become
    /// [`Error::Http`].
    #[instrument(skip(self, options), fields(method = %method, url = %url))]
    pub async fn request(
        &self,
        method: Method,
        url: Url,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        self.ensure_fresh().await?;

        fire_request_hooks(
            &self.inner.request_hooks,
            &RequestInfo {
                method: &method,
                url: &url,
                options: &options,
            },
        );

        let (response, generation) = self.send(&method, &url, &options).await?;
        if is_success(&response) {
            return Ok(self.accept(response));
        }

        let status = response.status().as_u16();
        if self.owns_session() && (status == 401 || status == 403) {
            warn!(status, "Token rejected by server, refreshing and retrying once");
            self.force_refresh(generation).await?;

            let (retried, _) = self.send(&method, &url, &options).await?;
            if is_success(&retried) {
                return Ok(self.accept(retried));
            }
            return Err(http_error(&method, &url, retried).await.into());
        }

        Err(http_error(&method, &url, response).await.into())
    }

    /// Send a request and decode a JSON response body.
    pub async fn request_json<R: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        options: RequestOptions,
    ) -> Result<R, Error> {
        let response = self.request(method, url, options).await?;
        let body = response.json::<R>().await.map_err(TransportError::from)?;
        Ok(body)
    }

    pub async fn get(&self, url: Url, options: RequestOptions) -> Result<Response, Error> {
        self.request(Method::GET, url, options).await
    }

    pub async fn post(&self, url: Url, options: RequestOptions) -> Result<Response, Error> {
        self.request(Method::POST, url, options).await
    }

    pub async fn put(&self, url: Url, options: RequestOptions) -> Result<Response, Error> {
        self.request(Method::PUT, url, options).await
    }

    pub async fn patch(&self, url: Url, options: RequestOptions) -> Result<Response, Error> {
        self.request(Method::PATCH, url, options).await
    }

    pub async fn delete(&self, url: Url, options: RequestOptions) -> Result<Response, Error> {
        self.request(Method::DELETE, url, options).await
    }

    fn state_needs_refresh(&self, state: &AuthState) -> bool {
        if !self.owns_session() {
            return false;
        }
        match state.expires_at {
            None => true,
            Some(expires_at) => expires_at - self.inner.clock.now() <= self.inner.skew,
        }
    }

    /// Refresh if the token is about to expire.
    async fn ensure_fresh(&self) -> Result<(), Error> {
        if !self.needs_refresh().await {
            return Ok(());
        }

        let _guard = self.inner.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        if !self.needs_refresh().await {
            trace!("Token refreshed by another caller");
            return Ok(());
        }

        self.refresh_locked().await
    }

    /// Refresh unless someone already replaced the token `generation` used.
    async fn force_refresh(&self, generation: u64) -> Result<(), Error> {
        let _guard = self.inner.refresh_lock.lock().await;
        if self.inner.state.read().await.generation != generation {
            debug!("Token already replaced since the rejected request");
            return Ok(());
        }
        self.refresh_locked().await
    }

    /// Caller must hold `refresh_lock`.
    async fn refresh_locked(&self) -> Result<(), Error> {
        let Some(authenticator) = &self.inner.authenticator else {
            return Ok(());
        };

        info!(flow = authenticator.kind(), "Refreshing token");
        let Authenticated { session, token } =
            authenticator
                .refresh()
                .await
                .map_err(|e| AuthError::RefreshFailed {
                    source: Box::new(e),
                })?;

        let mut state = self.inner.state.write().await;
        state.session = session;
        state.expires_at = Some(token.expires_at());
        state.generation += 1;
        debug!(expires_at = %token.expires_at(), generation = state.generation, "Token refreshed");
        Ok(())
    }

    /// Send once per attempt, retrying transient transport failures.
    ///
    /// Returns the response together with the token generation it was
    /// authorized with.
    async fn send(
        &self,
        method: &Method,
        url: &Url,
        options: &RequestOptions,
    ) -> Result<(Response, u64), Error> {
        let inner = &self.inner;
        inner
            .retry
            .run("request", move || async move {
                let state = inner.state.read().await.clone();
                let builder = options.apply(state.session.request(method.clone(), url.clone()));
                let response = builder.send().await.map_err(TransportError::from)?;
                trace!(status = %response.status(), "Response received");
                Ok((response, state.generation))
            })
            .await
    }

    fn accept(&self, response: Response) -> Response {
        fire_response_hooks(&self.inner.response_hooks, &response);
        response
    }
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("owns_session", &self.owns_session())
            .field("retry", &self.inner.retry)
            .field("skew", &self.inner.skew)
            .finish_non_exhaustive()
    }
}

fn is_success(response: &Response) -> bool {
    response.status().as_u16() < 400
}

async fn http_error(method: &Method, url: &Url, response: Response) -> HttpError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    HttpError::new(method.as_str(), url.as_str(), status, body)
}
