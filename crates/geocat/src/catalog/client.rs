//! Item and collection operations against the catalog API.

use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use crate::client::{RequestOptions, ResilientClient};
use crate::error::{Error, InvalidInputError};
use crate::search::{Link, PaginatedSearch, ResultStream, SearchRequest, extract_cursor, next_href};
use crate::types::ServiceUrl;

use super::model::Item;

/// Collections requested per page when listing.
const COLLECTIONS_PAGE_SIZE: usize = 10;

/// Client for the catalog API.
///
/// Every call goes through the shared [`ResilientClient`], so tokens are
/// refreshed and transient failures retried transparently.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: ResilientClient,
    base: ServiceUrl,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CollectionsPage {
    Paged {
        #[serde(default)]
        collections: Vec<Value>,
        #[serde(default)]
        links: Vec<Link>,
    },
    Bare(Vec<Value>),
}

impl CatalogClient {
    pub fn new(client: ResilientClient, base: ServiceUrl) -> Self {
        Self { client, base }
    }

    pub fn base(&self) -> &ServiceUrl {
        &self.base
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    /// Fetch a single item.
    #[instrument(skip(self))]
    pub async fn fetch_item(&self, collection_id: &str, item_id: &str) -> Result<Item, Error> {
        self.client
            .request_json(Method::GET, self.item_url(collection_id, item_id), RequestOptions::new())
            .await
    }

    /// Create an item in its collection (`POST /collections/{c}/items`).
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn create_item(&self, item: &Item) -> Result<(), Error> {
        let collection_id = require_collection(item)?;
        let url = self.base.join_segments(&["collections", collection_id, "items"]);
        self.client
            .post(url, RequestOptions::new().json(item)?)
            .await?;
        info!(collection_id, "Item created");
        Ok(())
    }

    /// Create or replace an item (`PUT /collections/{c}/items/{id}`).
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn add_item(&self, item: &Item) -> Result<(), Error> {
        let collection_id = require_collection(item)?;
        self.client
            .put(self.item_url(collection_id, &item.id), RequestOptions::new().json(item)?)
            .await?;
        info!(collection_id, "Item registered");
        Ok(())
    }

    /// Partially update an item with a JSON merge body.
    #[instrument(skip(self, changes))]
    pub async fn update_item(
        &self,
        collection_id: &str,
        item_id: &str,
        changes: Value,
    ) -> Result<(), Error> {
        self.client
            .patch(
                self.item_url(collection_id, item_id),
                RequestOptions::new().json_value(changes),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_item(&self, collection_id: &str, item_id: &str) -> Result<(), Error> {
        self.client
            .delete(self.item_url(collection_id, item_id), RequestOptions::new())
            .await?;
        info!("Item deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn fetch_collection(&self, collection_id: &str) -> Result<Value, Error> {
        self.client
            .request_json(Method::GET, self.collection_url(collection_id), RequestOptions::new())
            .await
    }

    /// Create a collection from its JSON document.
    #[instrument(skip(self, collection))]
    pub async fn create_collection(&self, collection: &Value) -> Result<(), Error> {
        if collection.get("id").and_then(Value::as_str).is_none() {
            return Err(InvalidInputError::Other {
                message: "collection has no 'id'".to_string(),
            }
            .into());
        }
        self.client
            .post(
                self.base.join_segments(&["collections"]),
                RequestOptions::new().json(collection)?,
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, changes))]
    pub async fn update_collection(&self, collection_id: &str, changes: Value) -> Result<(), Error> {
        self.client
            .patch(
                self.collection_url(collection_id),
                RequestOptions::new().json_value(changes),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_collection(&self, collection_id: &str) -> Result<(), Error> {
        self.client
            .delete(self.collection_url(collection_id), RequestOptions::new())
            .await?;
        Ok(())
    }

    /// Stream every collection, following `cursor` links page by page.
    ///
    /// Entries whose `type` is not `Collection` are skipped.
    pub fn collections(&self) -> ResultStream<Value> {
        let client = self.client.clone();
        let url = self.base.join_segments(&["collections"]);

        let stream = async_stream::try_stream! {
            let mut cursor: Option<String> = None;
            loop {
                let mut options = RequestOptions::new().query("limit", COLLECTIONS_PAGE_SIZE);
                if let Some(cursor) = &cursor {
                    options = options.query("cursor", cursor);
                }

                let page: CollectionsPage = client
                    .request_json(Method::GET, url.clone(), options)
                    .await?;
                let (collections, links) = match page {
                    CollectionsPage::Paged { collections, links } => (collections, links),
                    CollectionsPage::Bare(collections) => (collections, Vec::new()),
                };
                debug!(count = collections.len(), "Fetched collections page");

                for collection in collections {
                    if collection.get("type").and_then(Value::as_str) == Some("Collection") {
                        yield collection;
                    }
                }

                cursor = next_href(&links).and_then(|href| extract_cursor(&url, href));
                if cursor.is_none() {
                    break;
                }
            }
        };

        ResultStream::from_stream(stream)
    }

    /// Prepare a paginated search over `POST /search`.
    pub fn search(&self, request: &SearchRequest) -> Result<PaginatedSearch, Error> {
        Ok(PaginatedSearch::new(
            self.client.clone(),
            self.base.join_segments(&["search"]),
            request.to_body()?,
        ))
    }

    /// Items of one collection as a paginated search.
    pub fn collection_items(&self, collection_id: &str) -> Result<PaginatedSearch, Error> {
        self.search(&SearchRequest::new().collection(collection_id))
    }

    fn item_url(&self, collection_id: &str, item_id: &str) -> Url {
        self.base
            .join_segments(&["collections", collection_id, "items", item_id])
    }

    fn collection_url(&self, collection_id: &str) -> Url {
        self.base.join_segments(&["collections", collection_id])
    }
}

fn require_collection(item: &Item) -> Result<&str, Error> {
    item.collection.as_deref().ok_or_else(|| {
        InvalidInputError::Other {
            message: format!("item '{}' has no collection", item.id),
        }
        .into()
    })
}
