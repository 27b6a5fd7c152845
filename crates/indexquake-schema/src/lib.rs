//! Index schema, document model, and synthetic record generation for indexquake.
//!
//! This crate defines the data layer shared by every other crate: field
//! descriptors and the additive-only `IndexSchema`, the `Book` document shape
//! with its key `Namespace`, the fixed canary record, and the
//! `RecordGenerator` collaborator that produces randomized books.

pub mod book;
pub mod field;
pub mod generator;
pub mod types;
pub mod words;

pub use book::{book_index_schema, Book, Dimensions, InventoryItem, Metrics, CANARY_ID};
pub use field::{FieldDescriptor, FieldType, IndexSchema};
pub use generator::{FakeBookGenerator, RecordGenerator};
pub use types::{DocKey, IndexName, Namespace};
pub use words::random_word;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("field alias must not be empty")]
    EmptyAlias,
    #[error("field '{0}' must use a JSON path starting with '$.'")]
    InvalidPath(String),
    #[error("alias '{0}' is already declared in the schema")]
    DuplicateAlias(String),
    #[error("unknown field type '{0}'")]
    UnknownFieldType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_display_duplicate_alias() {
        let e = SchemaError::DuplicateAlias("title".to_owned());
        assert!(e.to_string().contains("'title'"));
        assert!(e.to_string().contains("already declared"));
    }
}
