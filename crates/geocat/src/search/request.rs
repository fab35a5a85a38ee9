//! Search request bodies.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, InvalidInputError};

/// Filters for a catalog search.
///
/// Serializes to the JSON body of `POST /search`; the paginator adds `limit`
/// and `cursor` to a copy of it for every page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub collections: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    /// GeoJSON geometry the results must intersect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersects: Option<Value>,
    /// RFC 3339 instant or `start/end` interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    /// Property filters, e.g. `{"platform": {"eq": "sat-1"}}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collections.push(collection.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    pub fn bbox(mut self, bbox: [f64; 4]) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn intersects(mut self, geometry: Value) -> Self {
        self.intersects = Some(geometry);
        self
    }

    pub fn datetime(mut self, datetime: impl Into<String>) -> Self {
        self.datetime = Some(datetime.into());
        self
    }

    /// Add a property filter: `property` `op` `value`, e.g. `("platform", "eq", "sat-1")`.
    pub fn filter(mut self, property: impl Into<String>, op: &str, value: Value) -> Self {
        let query = self.query.get_or_insert_with(Map::new);
        let entry = query
            .entry(property.into())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(ops) = entry {
            ops.insert(op.to_string(), value);
        }
        self
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// The JSON object sent as the search body.
    pub fn to_body(&self) -> Result<Map<String, Value>, Error> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(InvalidInputError::Body {
                reason: "search request did not serialize to an object".to_string(),
            }
            .into()),
            Err(e) => Err(InvalidInputError::Body {
                reason: e.to_string(),
            }
            .into()),
        }
    }
}
