//! geocat - Client library for an OAuth2-protected geospatial catalog and
//! its asset storage.
//!
//! All service calls flow through a [`ResilientClient`], which keeps its
//! bearer token fresh, retries transient network failures, and retries once
//! after an authorization rejection. On top of it sit the [`CatalogClient`]
//! (items, collections, paginated search) and the [`StorageClient`]
//! (parallel asset uploads, downloads and deletions).
//!
//! # Example
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use geocat::{CatalogClient, Config, ResilientClient, SearchRequest};
//! use geocat::auth::http_client;
//!
//! # async fn example() -> Result<(), geocat::Error> {
//! let config = Config::default().apply_env(|name| std::env::var(name).ok());
//! let http = http_client(config.request_timeout())?;
//! let client = ResilientClient::builder()
//!     .retry_policy(config.retry_policy())
//!     .skew(config.skew())
//!     .authenticate(config.authenticator(http)?)
//!     .await?;
//!
//! let catalog = CatalogClient::new(client, config.catalog_url()?);
//! let search = catalog
//!     .search(&SearchRequest::new().collection("sentinel-2"))?
//!     .max_items(100);
//!
//! let mut results = search.stream();
//! while let Some(feature) = results.next().await {
//!     println!("{}", feature?["id"]);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod search;
pub mod storage;
pub mod transfer;
pub mod types;

// Re-export primary types at crate root for convenience
pub use auth::{Authenticator, HttpSession, Token, TokenCache};
pub use catalog::{Asset, CatalogClient, Item};
pub use client::{RequestOptions, ResilientClient};
pub use config::Config;
pub use error::Error;
pub use retry::RetryPolicy;
pub use search::{PaginatedSearch, SearchRequest};
pub use storage::StorageClient;
pub use transfer::{BatchEngine, BatchResult};
pub use types::ServiceUrl;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
