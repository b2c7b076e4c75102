//! Kiosk core types: records, cursors, sort specs and the error taxonomy.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod collections;
pub mod error;
pub mod sort;

pub use collections::{Collection, CollectionSpec, SortOption};
pub use error::{KioskError, KioskResult};
pub use sort::{SortOrder, SortSpec, SortValue};

/// Document identifier as minted by the store.
pub type RecordId = String;

/// Opaque business payload of a document (name, price, status, ...).
pub type Fields = serde_json::Map<String, serde_json::Value>;

pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

/// A listable entity: unique id, timestamps, and orderable field values.
pub trait Record: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    /// Creation time, epoch milliseconds.
    fn created_at(&self) -> i64;
    /// Last update time, epoch milliseconds.
    fn updated_at(&self) -> i64;
    /// Value used for ordering by `key`; `None` when the record lacks the field.
    fn sort_value(&self, key: &str) -> Option<SortValue>;
}

/// Generic store document. Business fields stay opaque to the pagination engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: RecordId,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> { self.fields.get(name) }

    /// Display label: `name`, else `code`, else the id.
    pub fn label(&self) -> String {
        self.field("name")
            .or_else(|| self.field("code"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.id.clone())
    }

    pub fn created_at_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> { millis_to_utc(self.created_at) }
    pub fn updated_at_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> { millis_to_utc(self.updated_at) }
}

impl Record for Document {
    fn id(&self) -> &str { &self.id }
    fn created_at(&self) -> i64 { self.created_at }
    fn updated_at(&self) -> i64 { self.updated_at }

    fn sort_value(&self, key: &str) -> Option<SortValue> {
        match key {
            CREATED_AT => Some(SortValue::Number(self.created_at as f64)),
            UPDATED_AT => Some(SortValue::Number(self.updated_at as f64)),
            "id" => Some(SortValue::Text(self.id.clone())),
            other => self.fields.get(other).and_then(SortValue::from_json),
        }
    }
}

/// Convert store-native epoch milliseconds into a portable UTC timestamp.
pub fn millis_to_utc(ms: i64) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms)
}

pub fn now_millis() -> i64 { chrono::Utc::now().timestamp_millis() }

/// Continuation token for cursor-paged queries.
///
/// Only the store that minted a cursor can interpret it; everything above the
/// store boundary treats it as an opaque, serializable value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn from_token(token: impl Into<String>) -> Self { Self(token.into()) }
    pub fn token(&self) -> &str { &self.0 }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}
