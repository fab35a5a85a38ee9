//! Shared helpers for the mock-server tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use geocat::auth::{AccessToken, ClientCredentials, ClientCredentialsAuth, HttpSession};
use geocat::{ResilientClient, RetryPolicy, ServiceUrl};
use serde_json::json;
use url::Url;
use wiremock::{MockServer, Request, Respond, ResponseTemplate};

/// A service URL below the mock server.
pub fn service_url(server: &MockServer, base_path: &str) -> ServiceUrl {
    ServiceUrl::new(format!("http://127.0.0.1:{}{}", server.address().port(), base_path)).unwrap()
}

pub fn token_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/oauth/token", server.uri())).unwrap()
}

/// A URL on a port nothing listens on.
pub async fn closed_port_url(path: &str) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Url::parse(&format!("http://127.0.0.1:{port}{path}")).unwrap()
}

/// Retries with delays short enough for tests.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(5))
}

pub fn credentials_auth(server: &MockServer) -> ClientCredentialsAuth {
    let creds = ClientCredentials::new(
        "test-client",
        "test-secret",
        token_url(server),
        "https://api.example.com",
    );
    ClientCredentialsAuth::new(reqwest::Client::new(), creds).with_retry_policy(fast_retry(3))
}

/// A client that sends a fixed bearer token and never refreshes.
pub fn static_client() -> ResilientClient {
    ResilientClient::builder()
        .retry_policy(fast_retry(2))
        .with_session(HttpSession::new(
            reqwest::Client::new(),
            AccessToken::new("static-token"),
        ))
}

/// Token endpoint that hands out `token-1`, `token-2`, ... in order.
#[derive(Clone, Default)]
pub struct SequentialTokens {
    issued: Arc<AtomicUsize>,
}

impl SequentialTokens {
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

impl Respond for SequentialTokens {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        ResponseTemplate::new(200).set_body_json(json!({
            "access_token": format!("token-{n}"),
            "token_type": "Bearer",
            "expires_in": 3600
        }))
    }
}
