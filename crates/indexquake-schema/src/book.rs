//! The book document shape written by the harness and the index schema that covers it.

use crate::field::{FieldDescriptor, IndexSchema};
use serde::{Deserialize, Serialize};

/// Id of the canary document. Writers and chaos commands draw ids from `1..`.
pub const CANARY_ID: u64 = 0;
pub const CANARY_AUTHOR: &str = "Ada Sentinel";
pub const CANARY_TITLE: &str = "Canary Ledger";
pub const CANARY_ADDRESS: &str = "1 Sentinel Row, Ledger City";
/// Full-text term that only the canary's author field contains.
pub const CANARY_SEARCH_TERM: &str = "Sentinel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryStatus {
    Available,
    Maintenance,
    OnLoan,
    ForSale,
}

impl InventoryStatus {
    pub const ALL: [InventoryStatus; 4] = [
        InventoryStatus::Available,
        InventoryStatus::Maintenance,
        InventoryStatus::OnLoan,
        InventoryStatus::ForSale,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Hardcover,
    Paperback,
    Ebook,
}

impl BookFormat {
    pub const ALL: [BookFormat; 3] = [BookFormat::Hardcover, BookFormat::Paperback, BookFormat::Ebook];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub status: InventoryStatus,
    pub stock_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub rating_votes: u32,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width_cm: f64,
    pub height_cm: f64,
    pub depth_cm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub author: String,
    pub title: String,
    pub description: String,
    pub editions: Vec<String>,
    pub genres: Vec<String>,
    pub inventory: Vec<InventoryItem>,
    pub metrics: Metrics,
    pub pages: u32,
    pub url: String,
    pub year_published: u32,
    pub format: BookFormat,
    pub is_available: bool,
    pub price: f64,
    pub isbn: String,
    pub address: String,
    /// `"<lon>,<lat>"`
    pub geo: String,
    pub weight_grams: i32,
    pub dimensions: Dimensions,
    pub edition_number: u32,
    pub chapter_count: u32,
    pub review_count: u32,
    pub citation_count: u32,
    pub timestamp: i64,
    pub publishing_delay: i32,
    pub word_count: u32,
    pub reading_time_minutes: u32,
    pub global_sales: u32,
    pub translations_count: u32,
    pub publisher: String,
    pub book_series: String,
    pub main_character: String,
    pub location: String,
    pub author_age_at_publication: u32,
    /// Not indexed; present so documents carry some unindexed payload.
    pub shelf_code: i32,
}

impl Book {
    /// Overwrite the identifying fields with the fixed canary values.
    #[must_use]
    pub fn into_canary(mut self) -> Self {
        self.id = CANARY_ID.to_string();
        self.author = CANARY_AUTHOR.to_owned();
        self.title = CANARY_TITLE.to_owned();
        self.address = CANARY_ADDRESS.to_owned();
        self
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// The declared schema for book documents. Every field is sortable.
pub fn book_index_schema() -> IndexSchema {
    let fields = vec![
        FieldDescriptor::text("$.author", "author"),
        FieldDescriptor::tag("$.id", "id"),
        FieldDescriptor::text("$.description", "description"),
        FieldDescriptor::tag("$.editions[*]", "editions"),
        FieldDescriptor::tag("$.genres[*]", "genres"),
        FieldDescriptor::numeric("$.pages", "pages"),
        FieldDescriptor::text("$.title", "title"),
        FieldDescriptor::numeric("$.year_published", "year_published"),
        FieldDescriptor::numeric("$.metrics.rating_votes", "rating_votes"),
        FieldDescriptor::numeric("$.metrics.score", "score"),
        FieldDescriptor::tag("$.inventory[*].status", "status"),
        FieldDescriptor::tag("$.inventory[*].stock_id", "stock_id"),
        FieldDescriptor::tag("$.format", "format"),
        FieldDescriptor::tag("$.is_available", "is_available"),
        FieldDescriptor::numeric("$.price", "price"),
        FieldDescriptor::tag("$.isbn", "isbn"),
        FieldDescriptor::geo("$.geo", "geo"),
        FieldDescriptor::text("$.publisher", "publisher"),
        FieldDescriptor::text("$.book_series", "book_series"),
        FieldDescriptor::text("$.main_character", "main_character"),
        FieldDescriptor::text("$.location", "location"),
        FieldDescriptor::numeric("$.edition_number", "edition_number"),
        FieldDescriptor::numeric("$.chapter_count", "chapter_count"),
        FieldDescriptor::numeric("$.review_count", "review_count"),
        FieldDescriptor::numeric("$.citation_count", "citation_count"),
        FieldDescriptor::numeric("$.publishing_delay", "publishing_delay"),
        FieldDescriptor::numeric("$.word_count", "word_count"),
        FieldDescriptor::numeric("$.timestamp", "timestamp"),
        FieldDescriptor::numeric("$.reading_time_minutes", "reading_time_minutes"),
        FieldDescriptor::numeric("$.global_sales", "global_sales"),
        FieldDescriptor::numeric("$.translations_count", "translations_count"),
        FieldDescriptor::numeric("$.author_age_at_publication", "author_age_at_publication"),
        FieldDescriptor::numeric("$.weight_grams", "weight_grams"),
        FieldDescriptor::numeric("$.dimensions.width_cm", "width_cm"),
        FieldDescriptor::numeric("$.dimensions.height_cm", "height_cm"),
        FieldDescriptor::numeric("$.dimensions.depth_cm", "depth_cm"),
    ];
    let mut schema = IndexSchema::default();
    for field in fields {
        // Aliases above are distinct literals; push cannot fail.
        let _ = schema.push(field.sortable());
    }
    schema
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldType;
    use crate::generator::{FakeBookGenerator, RecordGenerator};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn book_schema_has_all_fields_sortable() {
        let schema = book_index_schema();
        assert_eq!(schema.len(), 36);
        assert!(schema.fields().iter().all(|f| f.sortable));
        assert_eq!(schema.get("geo").unwrap().kind, FieldType::Geo);
        assert_eq!(schema.get("status").unwrap().path, "$.inventory[*].status");
        assert!(!schema.contains_alias("address"));
    }

    #[test]
    fn canary_overrides_identity_fields() {
        let mut rng = StdRng::seed_from_u64(7);
        let book = FakeBookGenerator.random_document(55, &mut rng).into_canary();
        assert_eq!(book.id, "0");
        assert_eq!(book.author, CANARY_AUTHOR);
        assert_eq!(book.title, CANARY_TITLE);
        assert_eq!(book.address, CANARY_ADDRESS);
        assert!(book.author.contains(CANARY_SEARCH_TERM));
    }

    #[test]
    fn book_json_uses_snake_case_enums() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut book = FakeBookGenerator.random_document(9, &mut rng);
        book.inventory = vec![InventoryItem {
            status: InventoryStatus::OnLoan,
            stock_id: "9_0".to_owned(),
        }];
        book.format = BookFormat::Ebook;
        let json = book.to_json().unwrap();
        assert_eq!(json["inventory"][0]["status"], "on_loan");
        assert_eq!(json["format"], "ebook");
        assert_eq!(json["id"], "9");
    }
}
