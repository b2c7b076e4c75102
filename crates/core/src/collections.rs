//! Built-in collections of the back-office console.
//!
//! This module provides:
//! - The collection names used at the store boundary
//! - Orderable fields per collection (a sort on anything else is a query failure)
//! - Fields that must be unique across a collection
//! - The sort selector options a list screen offers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{KioskError, CREATED_AT, UPDATED_AT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Categories,
    Products,
    Tags,
    Vouchers,
    Orders,
}

/// One entry of a sort selector: combined `field-direction` key plus label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SortOption {
    pub key: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub collection: Collection,
    pub orderable: &'static [&'static str],
    pub unique: &'static [&'static str],
    pub sort_options: &'static [SortOption],
}

impl CollectionSpec {
    pub fn is_orderable(&self, key: &str) -> bool { self.orderable.contains(&key) }

    pub fn sort_option(&self, key: &str) -> Option<&SortOption> { self.sort_options.iter().find(|o| o.key == key) }
}

const CREATED_OPTIONS: [SortOption; 2] = [
    SortOption { key: "createdAt-desc", label: "Date Created (New to Old)" },
    SortOption { key: "createdAt-asc", label: "Date Created (Old to New)" },
];

static PRODUCT_SORTS: [SortOption; 8] = [
    CREATED_OPTIONS[0],
    CREATED_OPTIONS[1],
    SortOption { key: "name-desc", label: "Name (Z-A)" },
    SortOption { key: "name-asc", label: "Name (A-Z)" },
    SortOption { key: "price-desc", label: "Price (High to Low)" },
    SortOption { key: "price-asc", label: "Price (Low to High)" },
    SortOption { key: "stock-desc", label: "Stock (High to Low)" },
    SortOption { key: "stock-asc", label: "Stock (Low to High)" },
];

static ORDER_SORTS: [SortOption; 6] = [
    CREATED_OPTIONS[0],
    CREATED_OPTIONS[1],
    SortOption { key: "customerName-desc", label: "Customer Name (Z-A)" },
    SortOption { key: "customerName-asc", label: "Customer Name (A-Z)" },
    SortOption { key: "total-desc", label: "Total (High to Low)" },
    SortOption { key: "total-asc", label: "Total (Low to High)" },
];

static NAMED_SORTS: [SortOption; 4] = [
    CREATED_OPTIONS[0],
    CREATED_OPTIONS[1],
    SortOption { key: "name-desc", label: "Name (Z-A)" },
    SortOption { key: "name-asc", label: "Name (A-Z)" },
];

static VOUCHER_SORTS: [SortOption; 6] = [
    CREATED_OPTIONS[0],
    CREATED_OPTIONS[1],
    SortOption { key: "code-asc", label: "Code (A-Z)" },
    SortOption { key: "code-desc", label: "Code (Z-A)" },
    SortOption { key: "discountPercentage-desc", label: "Discount (High to Low)" },
    SortOption { key: "discountPercentage-asc", label: "Discount (Low to High)" },
];

static SPECS: [CollectionSpec; 5] = [
    CollectionSpec {
        collection: Collection::Categories,
        orderable: &[CREATED_AT, UPDATED_AT, "name"],
        unique: &["name"],
        sort_options: &NAMED_SORTS,
    },
    CollectionSpec {
        collection: Collection::Products,
        orderable: &[CREATED_AT, UPDATED_AT, "name", "price", "stock"],
        unique: &["name"],
        sort_options: &PRODUCT_SORTS,
    },
    CollectionSpec {
        collection: Collection::Tags,
        orderable: &[CREATED_AT, UPDATED_AT, "name"],
        unique: &["name"],
        sort_options: &NAMED_SORTS,
    },
    CollectionSpec {
        collection: Collection::Vouchers,
        orderable: &[CREATED_AT, UPDATED_AT, "code", "discountPercentage", "expiryDate"],
        unique: &["code"],
        sort_options: &VOUCHER_SORTS,
    },
    CollectionSpec {
        collection: Collection::Orders,
        orderable: &[CREATED_AT, UPDATED_AT, "customerName", "total", "status"],
        unique: &[],
        sort_options: &ORDER_SORTS,
    },
];

impl Collection {
    pub const ALL: [Collection; 5] =
        [Collection::Categories, Collection::Products, Collection::Tags, Collection::Vouchers, Collection::Orders];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Categories => "categories",
            Collection::Products => "products",
            Collection::Tags => "tags",
            Collection::Vouchers => "vouchers",
            Collection::Orders => "orders",
        }
    }

    pub fn spec(&self) -> &'static CollectionSpec {
        // SPECS is declared in the same order as ALL
        let idx = Self::ALL.iter().position(|c| c == self).unwrap_or(0);
        &SPECS[idx]
    }

    /// Sort keys offered by the list screen, unpacked from the combined form.
    pub fn sort_keys(&self) -> SmallVec<[&'static str; 8]> {
        self.spec().sort_options.iter().map(|o| o.key).collect()
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Collection {
    type Err = KioskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| KioskError::Validation(format!("unknown collection: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SortSpec;

    #[test]
    fn specs_line_up_with_collections() {
        for c in Collection::ALL {
            assert_eq!(c.spec().collection, c);
            assert_eq!(c.name().parse::<Collection>().unwrap(), c);
        }
    }

    #[test]
    fn every_sort_option_is_orderable() {
        for c in Collection::ALL {
            for key in c.sort_keys() {
                let s = SortSpec::parse(key).expect("valid option");
                assert!(c.spec().is_orderable(&s.key), "{} not orderable on {}", s.key, c);
            }
        }
    }

    #[test]
    fn unknown_collection_is_rejected() {
        assert!("customers".parse::<Collection>().is_err());
    }
}
