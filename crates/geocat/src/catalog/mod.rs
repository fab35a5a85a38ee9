//! Catalog items, collections and search.

mod client;
mod model;

pub use client::CatalogClient;
pub use model::{Asset, Item};
