//! Cursor codec shared by the document stores.
//!
//! A cursor encodes the position of the last returned document: its sort value
//! and id, plus the collection and sort it was minted under so that a cursor is
//! never replayed against a different ordering.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use kiosk_core::{Collection, Cursor, KioskError, KioskResult, SortOrder, SortSpec, SortValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorKey {
    #[serde(rename = "c")]
    pub collection: Collection,
    #[serde(rename = "k")]
    pub key: String,
    #[serde(rename = "o")]
    pub order: SortOrder,
    #[serde(rename = "v")]
    pub value: SortValue,
    pub id: String,
}

impl CursorKey {
    pub fn new(collection: Collection, sort: &SortSpec, value: SortValue, id: &str) -> Self {
        Self { collection, key: sort.key.clone(), order: sort.order, value, id: id.to_string() }
    }

    pub fn encode(&self) -> Cursor {
        // Serializing plain data into a Vec cannot fail
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        Cursor::from_token(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Decode and check the cursor belongs to `collection` under `sort`.
    pub fn decode(cursor: &Cursor, collection: Collection, sort: &SortSpec) -> KioskResult<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(cursor.token())
            .map_err(|e| KioskError::Query(format!("malformed cursor: {}", e)))?;
        let key: CursorKey =
            serde_json::from_slice(&bytes).map_err(|e| KioskError::Query(format!("malformed cursor: {}", e)))?;
        if key.collection != collection || key.key != sort.key || key.order != sort.order {
            return Err(KioskError::Query(format!(
                "cursor minted for {} ({} {}) replayed against {} ({})",
                key.collection, key.key, key.order, collection, sort
            )));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_is_bound_to_its_sort() {
        let sort = SortSpec::parse("price-asc").unwrap();
        let c = CursorKey::new(Collection::Products, &sort, SortValue::Number(9.5), "p1").encode();
        let back = CursorKey::decode(&c, Collection::Products, &sort).expect("same sort");
        assert_eq!(back.id, "p1");
        assert_eq!(back.value, SortValue::Number(9.5));

        let other = SortSpec::parse("price-desc").unwrap();
        assert!(matches!(CursorKey::decode(&c, Collection::Products, &other), Err(KioskError::Query(_))));
        assert!(CursorKey::decode(&c, Collection::Orders, &sort).is_err());
        assert!(CursorKey::decode(&Cursor::from_token("!!"), Collection::Products, &sort).is_err());
    }
}
