//! Page cache: the deduplicated, arrival-ordered accumulation of every record
//! fetched for one sort configuration.

use kiosk_core::{Cursor, Record, RecordId, SortSpec};
use metrics::counter;
use rustc_hash::FxHashSet;

#[derive(Debug, Clone)]
pub struct PageCache<R> {
    items: Vec<R>,
    ids: FxHashSet<RecordId>,
    cursor: Option<Cursor>,
    total_count: Option<u64>,
    sort: SortSpec,
    fetched: bool,
}

impl<R: Record> PageCache<R> {
    pub fn new(sort: SortSpec) -> Self {
        Self { items: Vec::new(), ids: FxHashSet::default(), cursor: None, total_count: None, sort, fetched: false }
    }

    pub fn sort(&self) -> &SortSpec { &self.sort }
    pub fn items(&self) -> &[R] { &self.items }
    pub fn len(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn cursor(&self) -> Option<&Cursor> { self.cursor.as_ref() }
    pub fn total_count(&self) -> Option<u64> { self.total_count }
    /// At least one page has been merged since the last reset.
    pub fn fetched(&self) -> bool { self.fetched }
    pub fn contains(&self, id: &str) -> bool { self.ids.contains(id) }

    /// Append the records not seen yet, in arrival order; cursor and total are
    /// replaced unconditionally. Returns the number of records appended.
    pub fn merge(&mut self, records: Vec<R>, next_cursor: Option<Cursor>, total_count: u64) -> usize {
        let offered = records.len();
        let before = self.items.len();
        for r in records {
            if self.ids.insert(r.id().to_string()) {
                self.items.push(r);
            }
        }
        self.cursor = next_cursor;
        self.total_count = Some(total_count);
        self.fetched = true;
        let appended = self.items.len() - before;
        if appended < offered {
            counter!("kiosk_cache_dedup_skipped_total", (offered - appended) as u64);
        }
        appended
    }

    /// `items[(page-1)*page_size .. page*page_size]`, clamped to what is cached.
    pub fn slice_for_page(&self, page: usize, page_size: usize) -> &[R] {
        if page == 0 || page_size == 0 {
            return &[];
        }
        let start = (page - 1).saturating_mul(page_size).min(self.items.len());
        let end = page.saturating_mul(page_size).min(self.items.len());
        &self.items[start..end]
    }

    /// The cursor ran out after at least one fetch.
    pub fn is_exhausted(&self) -> bool { self.fetched && self.cursor.is_none() }

    /// Every record of the collection is already local.
    pub fn is_complete(&self) -> bool {
        self.is_exhausted() || (self.fetched && self.total_count.is_some_and(|t| self.items.len() as u64 >= t))
    }

    /// Whether page `page` can be served without fetching.
    pub fn has_page(&self, page: usize, page_size: usize) -> bool {
        if page == 0 || page_size == 0 {
            return false;
        }
        if self.items.len() >= page.saturating_mul(page_size) {
            return true;
        }
        // Partial tail page (or the single empty page of an empty collection)
        self.is_complete() && (page == 1 || (page - 1).saturating_mul(page_size) < self.items.len())
    }

    pub fn reset(&mut self) {
        self.items.clear();
        self.ids.clear();
        self.cursor = None;
        self.total_count = None;
        self.fetched = false;
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        if !self.ids.contains(id) {
            return None;
        }
        self.items.iter().position(|r| r.id() == id)
    }

    /// Insert a locally created record at `idx` (clamped). Ignored if the id is
    /// already cached.
    pub fn insert_at(&mut self, idx: usize, record: R) -> bool {
        if !self.ids.insert(record.id().to_string()) {
            return false;
        }
        let idx = idx.min(self.items.len());
        self.items.insert(idx, record);
        self.total_count = self.total_count.map(|t| t + 1);
        true
    }

    /// Replace a cached record in place.
    pub fn replace(&mut self, record: R) -> bool {
        match self.position(record.id()) {
            Some(idx) => {
                self.items[idx] = record;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<R> {
        let idx = self.position(id)?;
        self.ids.remove(id);
        self.total_count = self.total_count.map(|t| t.saturating_sub(1));
        Some(self.items.remove(idx))
    }
}
