//! Pre-request and post-response callbacks.
//!
//! Hooks are fire-and-log: a hook that returns an error is reported at
//! `warn` level and the request carries on as if it had succeeded. A hook
//! can never change the outcome of the call it observes.

use std::sync::Arc;

use reqwest::{Method, Response};
use tracing::warn;
use url::Url;

use super::request::RequestOptions;

/// Error type hooks may return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// What a request hook gets to see.
#[derive(Debug)]
pub struct RequestInfo<'a> {
    pub method: &'a Method,
    pub url: &'a Url,
    pub options: &'a RequestOptions,
}

/// Called before a request is sent.
pub type RequestHook = Arc<dyn Fn(&RequestInfo<'_>) -> Result<(), HookError> + Send + Sync>;

/// Called with every successful response before it is returned.
pub type ResponseHook = Arc<dyn Fn(&Response) -> Result<(), HookError> + Send + Sync>;

pub(crate) fn fire_request_hooks(hooks: &[RequestHook], info: &RequestInfo<'_>) {
    for (index, hook) in hooks.iter().enumerate() {
        if let Err(e) = hook(info) {
            warn!(hook = index, error = %e, "Request hook failed");
        }
    }
}

pub(crate) fn fire_response_hooks(hooks: &[ResponseHook], response: &Response) {
    for (index, hook) in hooks.iter().enumerate() {
        if let Err(e) = hook(response) {
            warn!(hook = index, error = %e, "Response hook failed");
        }
    }
}
