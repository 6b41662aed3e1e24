//! Generic document record stored in a collection.
//!
//! # Invariants
//! - Every persisted item carries a string `id`.
//! - No schema is enforced beyond `id`; other fields pass through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field names the service reserves for its own metadata.
pub const SYSTEM_FIELDS: [&str; 4] = ["_rid", "_self", "_etag", "_ts"];

/// Arbitrary structured record addressed by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    /// All other fields, including service metadata once persisted.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets one field. `id` is routed to the identifier, not the field map.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if key == "id" {
            if let Value::String(id) = value {
                self.id = id;
            }
            return;
        }
        self.fields.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Service-assigned etag, present once persisted.
    pub fn etag(&self) -> Option<&str> {
        self.fields.get("_etag").and_then(Value::as_str)
    }

    /// Flattens the item into one JSON object with `id` included.
    pub fn to_body(&self) -> Map<String, Value> {
        let mut body = self.fields.clone();
        body.insert("id".to_string(), Value::String(self.id.clone()));
        body
    }

    /// Rebuilds an item from a stored JSON object.
    ///
    /// # Errors
    /// - Returns a message when `id` is missing or not a string.
    pub fn from_body(mut body: Map<String, Value>) -> Result<Self, String> {
        let id = match body.remove("id") {
            Some(Value::String(id)) => id,
            Some(other) => return Err(format!("item id must be a string, got `{other}`")),
            None => return Err("item has no `id` field".to_string()),
        };
        Ok(Self { id, fields: body })
    }

    /// Returns a copy without service metadata fields.
    pub fn without_system_fields(&self) -> Self {
        let mut item = self.clone();
        for field in SYSTEM_FIELDS {
            item.fields.remove(field);
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::Item;
    use serde_json::{json, Map};

    #[test]
    fn set_routes_id_to_identifier() {
        let item = Item::new("1").with("id", "2").with("name", "buy milk");
        assert_eq!(item.id, "2");
        assert!(item.get("id").is_none());
        assert_eq!(item.get("name"), Some(&json!("buy milk")));
    }

    #[test]
    fn from_body_requires_string_id() {
        let mut body = Map::new();
        body.insert("id".to_string(), json!(7));
        assert!(Item::from_body(body).unwrap_err().contains("string"));
        assert!(Item::from_body(Map::new()).is_err());
    }

    #[test]
    fn serde_flattens_fields_next_to_id() {
        let item = Item::new("1").with("completed", false);
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value, json!({ "id": "1", "completed": false }));
    }

    #[test]
    fn without_system_fields_strips_metadata_only() {
        let item = Item::new("1")
            .with("_etag", "abc")
            .with("_ts", 10)
            .with("name", "x");
        let stripped = item.without_system_fields();
        assert_eq!(item.etag(), Some("abc"));
        assert!(stripped.etag().is_none());
        assert_eq!(stripped.get("name"), Some(&json!("x")));
    }
}
