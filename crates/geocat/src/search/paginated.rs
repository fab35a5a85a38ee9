//! Lazy, restartable iteration over a POST search endpoint.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt, TryStreamExt};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::client::{RequestOptions, ResilientClient};
use crate::error::{Error, InvalidInputError, TransportError};

use super::cursor::{Link, extract_cursor, next_href};

/// Records requested per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// One page of a search response.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchPage {
    #[serde(default)]
    pub(crate) features: Vec<Value>,
    #[serde(default)]
    pub(crate) links: Vec<Link>,
}

/// A stream of search results.
///
/// Use with `futures_util::StreamExt` for convenient methods like `next()`.
pub struct ResultStream<T> {
    inner: Pin<Box<dyn Stream<Item = Result<T, Error>> + Send>>,
}

impl<T> ResultStream<T> {
    pub(crate) fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, Error>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl<T> Stream for ResultStream<T> {
    type Item = Result<T, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// A search that fetches its results page by page.
///
/// Each call to [`stream`](Self::stream) starts again from the first page.
/// Pages are fetched strictly one after another, each a single POST of a
/// copy of the body with `limit` and the current `cursor` added. The body
/// given to [`new`](Self::new) is never modified.
///
/// # Example
///
/// ```no_run
/// use futures_util::StreamExt;
/// use geocat::client::ResilientClient;
/// use geocat::search::{PaginatedSearch, SearchRequest};
///
/// # async fn example(client: ResilientClient) -> Result<(), geocat::Error> {
/// let body = SearchRequest::new().collection("sentinel-2").to_body()?;
/// let search = PaginatedSearch::new(
///     client,
///     "https://app.example.com/api/stac/search".parse().unwrap(),
///     body,
/// )
/// .max_items(200);
///
/// let mut results = search.stream();
/// while let Some(feature) = results.next().await {
///     println!("{}", feature?["id"]);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PaginatedSearch {
    client: ResilientClient,
    url: Url,
    body: Map<String, Value>,
    page_size: usize,
    max_items: Option<usize>,
}

impl PaginatedSearch {
    pub fn new(client: ResilientClient, url: Url, body: Map<String, Value>) -> Self {
        Self {
            client,
            url,
            body,
            page_size: DEFAULT_PAGE_SIZE,
            max_items: None,
        }
    }

    /// Build a search from any JSON value; it must be an object.
    pub fn from_value(client: ResilientClient, url: Url, body: Value) -> Result<Self, Error> {
        match body {
            Value::Object(body) => Ok(Self::new(client, url, body)),
            other => Err(InvalidInputError::Body {
                reason: format!("search body must be a JSON object, got {other}"),
            }
            .into()),
        }
    }

    /// Records requested per page. Zero is treated as one.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Stop after this many records.
    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    /// The caller-supplied body.
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Stream raw result records, starting from the first page.
    pub fn stream(&self) -> ResultStream<Value> {
        let client = self.client.clone();
        let url = self.url.clone();
        let body = self.body.clone();
        let page_size = self.page_size;
        let max_items = self.max_items;

        let stream = async_stream::try_stream! {
            let mut cursor: Option<String> = None;
            let mut yielded = 0usize;
            let mut pages = 0usize;

            loop {
                let remaining = max_items.map(|max| max.saturating_sub(yielded));
                if remaining == Some(0) {
                    break;
                }
                let limit = remaining.map_or(page_size, |remaining| page_size.min(remaining));

                let mut page_body = body.clone();
                page_body.insert("limit".to_string(), Value::from(limit));
                if let Some(cursor) = &cursor {
                    page_body.insert("cursor".to_string(), Value::from(cursor.as_str()));
                }

                let page: SearchPage = client
                    .request_json(
                        Method::POST,
                        url.clone(),
                        RequestOptions::new().json_value(Value::Object(page_body)),
                    )
                    .await?;
                pages += 1;
                debug!(
                    url = %url,
                    page = pages,
                    features = page.features.len(),
                    "Fetched search page"
                );

                if page.features.is_empty() {
                    break;
                }

                let take = remaining.unwrap_or(usize::MAX);
                for feature in page.features.into_iter().take(take) {
                    yielded += 1;
                    yield feature;
                }

                if max_items.is_some_and(|max| yielded >= max) {
                    break;
                }

                cursor = next_href(&page.links).and_then(|href| extract_cursor(&url, href));
                if cursor.is_none() {
                    break;
                }
            }
        };

        ResultStream::from_stream(stream)
    }

    /// Stream records decoded as `T`.
    pub fn items<T>(&self) -> ResultStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        ResultStream::from_stream(self.stream().map(|feature| {
            let feature = feature?;
            serde_json::from_value(feature).map_err(|e| {
                Error::from(TransportError::Decode {
                    message: e.to_string(),
                })
            })
        }))
    }

    /// Fetch every record into memory.
    pub async fn collect_all(&self) -> Result<Vec<Value>, Error> {
        self.stream().try_collect().await
    }
}
