//! Re-sendable request options.

use bytes::Bytes;
use reqwest::RequestBuilder;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::error::{Error, InvalidInputError};

/// Body of a request, kept in a form that can be sent more than once.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Serialized as JSON.
    Json(serde_json::Value),
    /// Sent as-is with the given content type.
    Bytes { content: Bytes, content_type: String },
}

/// Query, headers and body for one logical request.
///
/// The client may send a request several times (transient retries, the retry
/// after a forced refresh), so everything here is cloneable.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<RequestBody>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Set a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Use `value` serialized as JSON as the body.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self, Error> {
        let value = serde_json::to_value(value).map_err(|e| InvalidInputError::Body {
            reason: e.to_string(),
        })?;
        Ok(self.json_value(value))
    }

    /// Use an already built JSON value as the body.
    pub fn json_value(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    /// Use raw bytes as the body.
    pub fn bytes(mut self, content: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Bytes {
            content: content.into(),
            content_type: content_type.into(),
        });
        self
    }

    /// Query parameters in insertion order.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// The request body, if any.
    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub(crate) fn apply(&self, mut builder: RequestBuilder) -> RequestBuilder {
        if !self.query.is_empty() {
            builder = builder.query(&self.query);
        }
        if !self.headers.is_empty() {
            builder = builder.headers(self.headers.clone());
        }
        match &self.body {
            Some(RequestBody::Json(value)) => builder.json(value),
            Some(RequestBody::Bytes {
                content,
                content_type,
            }) => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(content.clone()),
            None => builder,
        }
    }
}
