use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{KioskError, KioskResult, CREATED_AT};

static FIELD_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    /// Orient an ascending comparison.
    pub fn apply(&self, ord: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for SortOrder {
    type Err = KioskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(KioskError::Validation(format!("invalid sort order: {} (expect asc or desc)", other))),
        }
    }
}

/// Sort configuration a cursor is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn new(key: &str, order: SortOrder) -> KioskResult<Self> {
        if !FIELD_NAME.is_match(key) {
            return Err(KioskError::Validation(format!("invalid sort field: {:?}", key)));
        }
        Ok(Self { key: key.to_string(), order })
    }

    /// Parse the combined `field-direction` form used by sort selectors
    /// (e.g. `createdAt-desc`).
    pub fn parse(combined: &str) -> KioskResult<Self> {
        let (key, order) = combined
            .rsplit_once('-')
            .ok_or_else(|| KioskError::Validation(format!("invalid sort key: {} (expect field-asc or field-desc)", combined)))?;
        Self::new(key, order.parse()?)
    }

    /// The combined `field-direction` form.
    pub fn combined(&self) -> String { format!("{}-{}", self.key, self.order) }
}

impl Default for SortSpec {
    fn default() -> Self { Self { key: CREATED_AT.to_string(), order: SortOrder::Desc } }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{} {}", self.key, self.order) }
}

/// Orderable scalar. Values of different kinds order by kind first
/// (bool < number < text), like document stores do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SortValue {
    pub fn from_json(v: &serde_json::Value) -> Option<Self> {
        match v {
            serde_json::Value::Bool(b) => Some(SortValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(SortValue::Number),
            serde_json::Value::String(s) => Some(SortValue::Text(s.clone())),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortValue::Bool(_) => 0,
            SortValue::Number(_) => 1,
            SortValue::Text(_) => 2,
        }
    }
}

impl Ord for SortValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Bool(a), SortValue::Bool(b)) => a.cmp(b),
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl PartialEq for SortValue {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for SortValue {}
