//! Token endpoint calls shared by both flows.

use serde::Deserialize;
use tracing::{debug, trace};
use url::Url;

use crate::error::{AuthError, Error, HttpError, TransportError};

use super::tokens::GrantResponse;

/// OAuth2 error body (RFC 6749 section 5.2).
#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// POST a form-encoded grant to `token_url`.
///
/// A 4xx answer means the identity provider rejected the grant and maps to
/// [`AuthError::GrantRejected`]. 5xx answers are plain [`HttpError`]s.
/// Connection failures surface as transient [`TransportError`]s so callers
/// can decide whether to retry.
pub(crate) async fn request_token(
    http: &reqwest::Client,
    token_url: &Url,
    form: &[(&str, &str)],
) -> Result<GrantResponse, Error> {
    let grant_type = form
        .iter()
        .find(|(k, _)| *k == "grant_type")
        .map(|(_, v)| *v)
        .unwrap_or("unknown");
    debug!(grant_type, token_url = %token_url, "Requesting token");

    let response = http
        .post(token_url.clone())
        .form(form)
        .send()
        .await
        .map_err(TransportError::from)?;

    let status = response.status();
    trace!(status = %status, "Token endpoint response");

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            return Err(AuthError::GrantRejected {
                status: status.as_u16(),
                message: describe_rejection(&body),
            }
            .into());
        }
        return Err(HttpError::new("POST", token_url.as_str(), status.as_u16(), body).into());
    }

    response
        .json::<GrantResponse>()
        .await
        .map_err(|e| {
            AuthError::InvalidTokenResponse {
                message: e.to_string(),
            }
            .into()
        })
}

fn describe_rejection(body: &str) -> String {
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(OAuthErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{error}: {description}"),
        Ok(OAuthErrorBody { error, .. }) => error,
        Err(_) if body.is_empty() => "no response body".to_string(),
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth_error_body_is_summarised() {
        assert_eq!(
            describe_rejection(r#"{"error":"invalid_client","error_description":"Unknown client"}"#),
            "invalid_client: Unknown client"
        );
        assert_eq!(describe_rejection(r#"{"error":"invalid_grant"}"#), "invalid_grant");
        assert_eq!(describe_rejection("Forbidden"), "Forbidden");
        assert_eq!(describe_rejection(""), "no response body");
    }
}
