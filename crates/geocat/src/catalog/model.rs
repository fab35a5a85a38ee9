//! Catalog records.
//!
//! Only the fields the storage layer works with are typed; everything else
//! is carried through untouched in `extra`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A catalog item (a GeoJSON feature with assets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default)]
    pub assets: BTreeMap<String, Asset>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    /// An item with no assets and no other fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            collection: None,
            assets: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_asset(mut self, key: impl Into<String>, asset: Asset) -> Self {
        self.assets.insert(key.into(), asset);
        self
    }
}

/// A file referenced by an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub href: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Asset {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            media_type: None,
            title: None,
            roles: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// The last path segment of the href, without query or fragment.
    pub fn file_name(&self) -> Option<&str> {
        let path = self
            .href
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');
        let name = path.rsplit('/').next()?;
        let name = Path::new(name).file_name()?.to_str()?;
        (!name.is_empty()).then_some(name)
    }
}
