// Database Interface - document-level operations the rest of the service is written against
// Documents are JSON objects grouped into collections and addressed by DocId.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{AppError, AppResult};
use crate::infrastructure::id_generator::DocId;
use crate::infrastructure::update::{Update, UpdateOutcome};

static FIELD_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid field pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Businesses,
    WholesaleDeals,
    Feeds,
    DailyServices,
    Societies,
    Requests,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Businesses => "businesses",
            Collection::WholesaleDeals => "wholesale_deals",
            Collection::Feeds => "feeds",
            Collection::DailyServices => "daily_services",
            Collection::Societies => "societies",
            Collection::Requests => "requests",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "users" => Some(Collection::Users),
            "businesses" => Some(Collection::Businesses),
            "wholesale_deals" => Some(Collection::WholesaleDeals),
            "feeds" => Some(Collection::Feeds),
            "daily_services" => Some(Collection::DailyServices),
            "societies" => Some(Collection::Societies),
            "requests" => Some(Collection::Requests),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject field paths that could not have come from our own models before they are spliced
/// into a JSON path expression.
pub fn validate_field_path(path: &str) -> AppResult<&str> {
    if FIELD_PATH_PATTERN.is_match(path) {
        Ok(path)
    } else {
        Err(AppError::Internal(format!("Illegal field path '{}'", path)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

/// Filter/sort/paginate one collection by top-level document fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub collection: Collection,
    pub equals: Vec<(String, Value)>,
    /// Array fields that must hold the given scalar.
    pub members: Vec<(String, Value)>,
    pub sort: Option<SortSpec>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindQuery {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            equals: Vec::new(),
            members: Vec::new(),
            sort: None,
            skip: 0,
            limit: None,
        }
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.equals.push((field.to_string(), value.into()));
        self
    }

    pub fn has_member(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.members.push((field.to_string(), value.into()));
        self
    }

    pub fn sort_desc(mut self, field: &str) -> Self {
        self.sort = Some(SortSpec {
            field: field.to_string(),
            descending: true,
        });
        self
    }

    pub fn sort_asc(mut self, field: &str) -> Self {
        self.sort = Some(SortSpec {
            field: field.to_string(),
            descending: false,
        });
        self
    }

    pub fn page(mut self, skip: u64, limit: u64) -> Self {
        self.skip = skip;
        self.limit = Some(limit);
        self
    }
}

/// One embedded array to flatten into the union.
#[derive(Debug, Clone, PartialEq)]
pub struct UnwindSource {
    pub collection: Collection,
    pub array: String,
    pub document_equals: Vec<(String, Value)>,
    pub element_equals: Vec<(String, Value)>,
    /// Element field the union is ordered by.
    pub sort_field: String,
}

impl UnwindSource {
    pub fn new(collection: Collection, array: &str, sort_field: &str) -> Self {
        Self {
            collection,
            array: array.to_string(),
            document_equals: Vec::new(),
            element_equals: Vec::new(),
            sort_field: sort_field.to_string(),
        }
    }

    pub fn where_document(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.document_equals.push((field.to_string(), value.into()));
        self
    }

    pub fn where_element(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.element_equals.push((field.to_string(), value.into()));
        self
    }
}

/// Inclusive numeric range on an element field (timestamps are epoch milliseconds).
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRange {
    pub field: String,
    pub from: i64,
    pub to: i64,
}

/// Union of unwound embedded arrays across collections, sorted and paginated as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct UnwindQuery {
    pub sources: Vec<UnwindSource>,
    pub range: Option<ElementRange>,
    pub descending: bool,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl UnwindQuery {
    pub fn new(sources: Vec<UnwindSource>) -> Self {
        Self {
            sources,
            range: None,
            descending: true,
            skip: 0,
            limit: None,
        }
    }

    pub fn within(mut self, field: &str, from: i64, to: i64) -> Self {
        self.range = Some(ElementRange {
            field: field.to_string(),
            from,
            to,
        });
        self
    }

    pub fn page(mut self, skip: u64, limit: u64) -> Self {
        self.skip = skip;
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnwoundRow {
    pub collection: Collection,
    pub document_id: DocId,
    pub document: Value,
    pub element: Value,
}

/// Document store operations. Every mutating call is atomic for the single document it touches;
/// nothing spans documents.
#[async_trait]
pub trait DocumentDatabase: Send + Sync {
    async fn get(&self, collection: Collection, id: &DocId) -> AppResult<Option<Value>>;
    async fn insert(&self, collection: Collection, id: &DocId, document: Value) -> AppResult<()>;
    async fn update(
        &self,
        collection: Collection,
        id: &DocId,
        update: &Update,
    ) -> AppResult<UpdateOutcome>;
    async fn delete(&self, collection: Collection, id: &DocId) -> AppResult<bool>;
    async fn find(&self, query: &FindQuery) -> AppResult<Vec<Value>>;
    async fn count(&self, query: &FindQuery) -> AppResult<u64>;
    async fn unwind(&self, query: &UnwindQuery) -> AppResult<Vec<UnwoundRow>>;
    async fn count_unwound(&self, query: &UnwindQuery) -> AppResult<u64>;
    async fn health_check(&self) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_path_validation() {
        assert!(validate_field_path("orders").is_ok());
        assert!(validate_field_path("price.sellingPrice").is_ok());
        assert!(validate_field_path("report') OR 1=1 --").is_err());
        assert!(validate_field_path("").is_err());
        assert!(validate_field_path("a..b").is_err());
    }

    #[test]
    fn test_collection_names_round_trip() {
        for collection in [
            Collection::Users,
            Collection::Businesses,
            Collection::WholesaleDeals,
            Collection::Feeds,
            Collection::DailyServices,
            Collection::Societies,
            Collection::Requests,
        ] {
            assert_eq!(Collection::parse(collection.as_str()), Some(collection));
        }
        assert_eq!(Collection::parse("orders"), None);
    }
}
