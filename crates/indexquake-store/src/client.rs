use crate::query::{AggregateRequest, SearchQuery};
use crate::StoreError;
use indexquake_schema::{FieldDescriptor, IndexSchema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub fields: BTreeMap<String, String>,
}

impl SearchDocument {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub total: u64,
    pub documents: Vec<SearchDocument>,
}

pub type AggregateRow = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexAttribute {
    pub identifier: String,
    pub alias: String,
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub num_docs: u64,
    pub prefixes: Vec<String>,
    pub attributes: Vec<IndexAttribute>,
}

/// One connection to the document store.
///
/// Methods take `&mut self` because a connection carries one request at a time.
pub trait StoreConnection: Send {
    /// Write `value` at `path` of the JSON document stored under `key`.
    /// Returns whether the store acknowledged the write.
    fn json_set(
        &mut self,
        key: &str,
        path: &str,
        value: &serde_json::Value,
    ) -> Result<bool, StoreError>;

    fn json_get(&mut self, key: &str, path: &str)
        -> Result<Option<serde_json::Value>, StoreError>;

    /// Returns the number of keys removed.
    fn delete(&mut self, key: &str) -> Result<u64, StoreError>;

    /// Returns whether a timeout was set (false if the key does not exist).
    fn expire(&mut self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    fn search(&mut self, index: &str, query: &SearchQuery) -> Result<SearchResult, StoreError>;

    fn aggregate(
        &mut self,
        index: &str,
        request: &AggregateRequest,
    ) -> Result<Vec<AggregateRow>, StoreError>;

    /// Create a JSON index over every key starting with `prefix`.
    fn create_index(
        &mut self,
        index: &str,
        prefix: &str,
        schema: &IndexSchema,
    ) -> Result<(), StoreError>;

    /// Append one field to a live index.
    fn alter_index(&mut self, index: &str, field: &FieldDescriptor) -> Result<(), StoreError>;

    /// Fails with [`StoreError::IndexNotFound`] if the index does not exist.
    fn index_info(&mut self, index: &str) -> Result<IndexInfo, StoreError>;

    fn alias_add(&mut self, alias: &str, index: &str) -> Result<(), StoreError>;

    /// Point `alias` at `index`, creating it if needed.
    fn alias_update(&mut self, alias: &str, index: &str) -> Result<(), StoreError>;

    fn flush_all(&mut self) -> Result<(), StoreError>;

    /// False once the underlying transport is known to be broken.
    fn is_open(&self) -> bool {
        true
    }
}

/// Opens connections for the pool.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError>;

    /// Human-readable endpoint, for logs.
    fn describe(&self) -> String;
}

/// Pick a connector from the URL scheme.
pub fn select_connector(url: &str) -> Result<Box<dyn Connector>, StoreError> {
    let scheme = url.split("://").next().unwrap_or_default();
    match scheme {
        "redis" | "rediss" | "redis+unix" | "unix" => {
            Ok(Box::new(crate::resp::RedisConnector::open(url)?))
        }
        "memory" => Ok(Box::new(crate::memory::MemoryConnector::default())),
        _ => Err(StoreError::UnsupportedUrl(url.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_known_connectors() {
        assert!(select_connector("redis://localhost:6379").is_ok());
        assert!(select_connector("memory://").is_ok());
    }

    #[test]
    fn select_unknown_scheme_fails() {
        assert!(matches!(
            select_connector("http://localhost:8080"),
            Err(StoreError::UnsupportedUrl(_))
        ));
        assert!(select_connector("localhost").is_err());
    }

    #[test]
    fn memory_connector_describes_itself() {
        let c = select_connector("memory://").unwrap();
        assert_eq!(c.describe(), "memory://");
    }

    #[test]
    fn search_document_field_lookup() {
        let mut doc = SearchDocument {
            id: "k".to_owned(),
            ..SearchDocument::default()
        };
        doc.fields.insert("$.title".to_owned(), "t".to_owned());
        assert_eq!(doc.field("$.title"), Some("t"));
        assert_eq!(doc.field("missing"), None);
    }
}
