//! Resilient client behaviour: refresh, retries, hooks and error mapping.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use geocat::auth::{AccessToken, HttpSession, ManualClock};
use geocat::client::{HookError, RequestHook, RequestInfo, RequestOptions, ResponseHook};
use geocat::error::TransportError;
use geocat::{Error, ResilientClient};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{SequentialTokens, closed_port_url, credentials_auth, fast_retry, static_client};

async fn mount_tokens(server: &MockServer, expected: u64) -> SequentialTokens {
    let tokens = SequentialTokens::default();
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(tokens.clone())
        .expect(expected)
        .mount(server)
        .await;
    tokens
}

fn start_of_minute() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp() / 60 * 60, 0).unwrap()
}

async fn owned_client(server: &MockServer, clock: &ManualClock) -> ResilientClient {
    ResilientClient::builder()
        .retry_policy(fast_retry(3))
        .clock(Arc::new(clock.clone()))
        .authenticate(credentials_auth(server).with_clock(Arc::new(clock.clone())).into())
        .await
        .unwrap()
}

fn data_url(server: &MockServer) -> url::Url {
    format!("{}/data", server.uri()).parse().unwrap()
}

// ============================================================================
// Token lifecycle
// ============================================================================

#[tokio::test]
async fn test_requests_carry_bearer_and_options() {
    let server = MockServer::start().await;
    let clock = ManualClock::new(start_of_minute());
    mount_tokens(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/data"))
        .and(header("authorization", "Bearer token-1"))
        .and(query_param("dry_run", "true"))
        .and(body_json(json!({"name": "scene"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = owned_client(&server, &clock).await;
    let options = RequestOptions::new()
        .query("dry_run", true)
        .json(&json!({"name": "scene"}))
        .unwrap();
    let response = client.post(data_url(&server), options).await.unwrap();

    assert_eq!(response.status().as_u16(), 201);
    assert!(client.owns_session());
}

#[tokio::test]
async fn test_expiring_token_is_refreshed_before_request() {
    let server = MockServer::start().await;
    let clock = ManualClock::new(start_of_minute());
    mount_tokens(&server, 2).await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = owned_client(&server, &clock).await;
    // Inside the 30 second skew window.
    clock.advance(TimeDelta::seconds(3600 - 10));
    assert!(client.needs_refresh().await);

    client.get(data_url(&server), RequestOptions::new()).await.unwrap();
    assert!(!client.needs_refresh().await);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    let clock = ManualClock::new(start_of_minute());
    let tokens = mount_tokens(&server, 2).await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(8)
        .mount(&server)
        .await;

    let client = owned_client(&server, &clock).await;
    clock.advance(TimeDelta::hours(2));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let url = data_url(&server);
        handles.push(tokio::spawn(async move {
            client.get(url, RequestOptions::new()).await.map(|r| r.status().as_u16())
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 200);
    }

    assert_eq!(tokens.issued(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rejections_share_one_forced_refresh() {
    let server = MockServer::start().await;
    let clock = ManualClock::new(start_of_minute());
    let tokens = mount_tokens(&server, 2).await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(8)
        .mount(&server)
        .await;

    // The token is still fresh, so only the 401s can trigger a refresh.
    let client = owned_client(&server, &clock).await;
    assert!(!client.needs_refresh().await);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let url = data_url(&server);
        handles.push(tokio::spawn(async move {
            client.get(url, RequestOptions::new()).await.map(|r| r.status().as_u16())
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 200);
    }

    assert_eq!(tokens.issued(), 2);
}

#[tokio::test]
async fn test_unauthorized_response_refreshes_and_retries_once() {
    let server = MockServer::start().await;
    let clock = ManualClock::new(start_of_minute());
    mount_tokens(&server, 2).await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("authorization", "Bearer token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = owned_client(&server, &clock).await;
    let body: serde_json::Value = client
        .request_json(reqwest::Method::GET, data_url(&server), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(body, json!({"items": []}));
}

#[tokio::test]
async fn test_repeated_rejection_surfaces_http_error() {
    let server = MockServer::start().await;
    let clock = ManualClock::new(start_of_minute());
    mount_tokens(&server, 2).await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(2)
        .mount(&server)
        .await;

    let client = owned_client(&server, &clock).await;
    let err = client
        .get(data_url(&server), RequestOptions::new())
        .await
        .unwrap_err();

    match err {
        Error::Http(http) => {
            assert_eq!(http.status, 403);
            assert_eq!(http.method, "GET");
            assert!(http.is_auth_failure());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_injected_session_is_never_refreshed() {
    let server = MockServer::start().await;
    mount_tokens(&server, 0).await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("authorization", "Bearer injected"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let session = HttpSession::from_authorization(reqwest::Client::new(), "Bearer injected").unwrap();
    let client = ResilientClient::builder().with_session(session);

    assert!(!client.owns_session());
    assert!(!client.needs_refresh().await);
    let err = client
        .get(data_url(&server), RequestOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[test]
fn test_injected_session_requires_bearer_scheme() {
    assert!(HttpSession::from_authorization(reqwest::Client::new(), "Basic abc").is_err());
    assert!(HttpSession::from_authorization(reqwest::Client::new(), "Bearer ").is_err());
}

// ============================================================================
// Transport failures and error bodies
// ============================================================================

#[tokio::test]
async fn test_connection_failures_are_retried_then_reported() {
    let client = ResilientClient::builder()
        .retry_policy(fast_retry(3))
        .with_session(HttpSession::new(reqwest::Client::new(), AccessToken::new("t")));

    let err = client
        .get(closed_port_url("/data").await, RequestOptions::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("gave up after 3 attempts"));
    assert!(matches!(
        err,
        Error::Transport(TransportError::RetriesExhausted { attempts: 3, .. })
    ));
}

#[tokio::test]
async fn test_server_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "errors": [{
                "message": "boom",
                "field": "id",
                "type": "internal",
                "trace_id": "abc123"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = static_client()
        .delete(data_url(&server), RequestOptions::new())
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("HTTP error during DELETE request to "));
    assert!(message.contains("boom (field: id, type: internal, trace_id: abc123)"));
    match err {
        Error::Http(http) => assert_eq!(http.details.len(), 1),
        other => panic!("unexpected error: {other:?}"),
    }
}

// ============================================================================
// Hooks
// ============================================================================

#[tokio::test]
async fn test_failing_hooks_do_not_affect_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let seen_requests = Arc::new(AtomicUsize::new(0));
    let seen_responses = Arc::new(AtomicUsize::new(0));

    let request_counter = Arc::clone(&seen_requests);
    let request_hook: RequestHook = Arc::new(move |info: &RequestInfo<'_>| -> Result<(), HookError> {
        assert_eq!(info.method, &reqwest::Method::GET);
        request_counter.fetch_add(1, Ordering::SeqCst);
        Err("request hook failed".into())
    });
    let response_counter = Arc::clone(&seen_responses);
    let response_hook: ResponseHook = Arc::new(move |response: &reqwest::Response| -> Result<(), HookError> {
        assert_eq!(response.status().as_u16(), 200);
        response_counter.fetch_add(1, Ordering::SeqCst);
        Err("response hook failed".into())
    });

    let client = ResilientClient::builder()
        .request_hook(request_hook)
        .response_hook(response_hook)
        .with_session(HttpSession::new(reqwest::Client::new(), AccessToken::new("t")));

    for _ in 0..2 {
        let response = client.get(data_url(&server), RequestOptions::new()).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    assert_eq!(seen_requests.load(Ordering::SeqCst), 2);
    assert_eq!(seen_responses.load(Ordering::SeqCst), 2);
}
