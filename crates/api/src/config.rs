//! Runtime settings read from `KIOSK_*` environment variables.

use kiosk_core::SortSpec;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::warn;

pub const DEFAULT_PAGE_SIZES: [usize; 3] = [2, 3, 4];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    /// Page sizes a list offers; the first one is the initial size.
    pub page_sizes: SmallVec<[usize; 4]>,
    pub default_sort: SortSpec,
    pub db_path: Option<String>,
    pub admin_email: Option<String>,
    #[serde(skip)]
    pub admin_password: Option<String>,
    pub metrics_addr: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page_sizes: SmallVec::from_slice(&DEFAULT_PAGE_SIZES),
            default_sort: SortSpec::default(),
            db_path: None,
            admin_email: None,
            admin_password: None,
            metrics_addr: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self { Self::from_lookup(|k| std::env::var(k).ok()) }

    /// Build settings from any key lookup; malformed values fall back to defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut s = Settings::default();
        if let Some(raw) = get("KIOSK_PAGE_SIZES") {
            match parse_page_sizes(&raw) {
                Some(sizes) => s.page_sizes = sizes,
                None => warn!(value = %raw, "config: KIOSK_PAGE_SIZES ignored"),
            }
        }
        if let Some(raw) = get("KIOSK_DEFAULT_SORT") {
            match SortSpec::parse(&raw) {
                Ok(sort) => s.default_sort = sort,
                Err(e) => warn!(value = %raw, error = %e, "config: KIOSK_DEFAULT_SORT ignored"),
            }
        }
        s.db_path = get("KIOSK_DB_PATH").filter(|v| !v.is_empty());
        s.admin_email = get("KIOSK_ADMIN_EMAIL").filter(|v| !v.is_empty());
        s.admin_password = get("KIOSK_ADMIN_PASSWORD");
        s.metrics_addr = get("KIOSK_METRICS_ADDR").filter(|v| !v.is_empty());
        s
    }

    pub fn initial_page_size(&self) -> usize { self.page_sizes.first().copied().unwrap_or(DEFAULT_PAGE_SIZES[0]) }
}

/// `"2,3,4"` -> `[2, 3, 4]`; zero, junk, or an empty list yields `None`.
fn parse_page_sizes(raw: &str) -> Option<SmallVec<[usize; 4]>> {
    let mut out = SmallVec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<usize>() {
            Ok(n) if n > 0 => {
                if !out.contains(&n) {
                    out.push(n);
                }
            }
            _ => return None,
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}
