//! One-shot local listener for the OAuth2 redirect.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{AuthError, Error};

/// Path the identity provider redirects the browser to.
pub(crate) const CALLBACK_PATH: &str = "/oauth/callback";

const LOGIN_COMPLETE: &str = "Login complete. You can close this window.";
const NO_CODE: &str = "No authorization code found.";

/// How long to let the final response flush after the outcome is known.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// What the listener saw before it stopped.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CallbackOutcome {
    /// The redirect carried `?code=...`.
    Code(String),
    /// The redirect arrived without a code.
    MissingCode,
    /// Nothing arrived in time.
    TimedOut,
}

type Slot = Arc<Mutex<Option<oneshot::Sender<Option<String>>>>>;

/// A bound but not yet serving redirect listener.
///
/// Binding happens before the browser is opened so the redirect can never
/// arrive at a closed port.
pub(crate) struct CallbackListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl CallbackListener {
    /// Bind `127.0.0.1:<port>`. Port `0` picks a free port.
    pub(crate) async fn bind(port: u16) -> Result<Self, Error> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| AuthError::CallbackListener {
                port,
                message: e.to_string(),
            })?;
        let addr = listener
            .local_addr()
            .map_err(|e| AuthError::CallbackListener {
                port,
                message: e.to_string(),
            })?;
        Ok(Self { listener, addr })
    }

    /// The port actually bound.
    pub(crate) fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Serve the callback route until one request arrives or `timeout` passes.
    ///
    /// Only the first request to [`CALLBACK_PATH`] is handled; it gets a 200
    /// if it carries a code and a 400 otherwise. The listener is closed
    /// before this returns.
    pub(crate) async fn wait_for_code(self, timeout: Duration) -> CallbackOutcome {
        let (code_tx, code_rx) = oneshot::channel();
        let slot: Slot = Arc::new(Mutex::new(Some(code_tx)));

        let app = Router::new()
            .route(CALLBACK_PATH, get(handle_callback))
            .with_state(slot);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let listener = self.listener;
        let server = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                warn!(error = %e, "Callback listener stopped with an error");
            }
        });

        debug!(port = self.addr.port(), "Waiting for login redirect");
        let outcome = match tokio::time::timeout(timeout, code_rx).await {
            Ok(Ok(Some(code))) => CallbackOutcome::Code(code),
            Ok(Ok(None)) | Ok(Err(_)) => CallbackOutcome::MissingCode,
            Err(_) => CallbackOutcome::TimedOut,
        };

        let _ = shutdown_tx.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, server).await.is_err() {
            debug!("Callback listener did not drain in time");
        }

        outcome
    }
}

async fn handle_callback(
    State(slot): State<Slot>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, &'static str) {
    let sender = slot.lock().ok().and_then(|mut guard| guard.take());
    let Some(sender) = sender else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Login already handled.");
    };

    let code = params.get("code").filter(|c| !c.is_empty()).cloned();
    let reply = if code.is_some() {
        (StatusCode::OK, LOGIN_COMPLETE)
    } else {
        (StatusCode::BAD_REQUEST, NO_CODE)
    };

    let _ = sender.send(code);
    reply
}
