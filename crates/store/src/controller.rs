//! Pagination controller: turns page/size/sort requests into cache lookups and,
//! only when the cache cannot serve them, cursor fetches.
//!
//! Every transition stages its fetches and commits only after they succeed, so
//! a failed transition leaves the page, the page size and the cache untouched.

use kiosk_core::{KioskError, KioskResult, Record, SortOrder, SortSpec};
use kiosk_source::{Page, PageRequest, PagedQuerySource};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::cache::PageCache;

pub struct PaginationController<S: PagedQuerySource> {
    source: S,
    cache: PageCache<S::Item>,
    default_sort: SortSpec,
    current_page: usize,
    page_size: usize,
    stop: Option<oneshot::Receiver<()>>,
}

impl<S: PagedQuerySource> PaginationController<S> {
    pub fn new(source: S, page_size: usize) -> Self { Self::with_default_sort(source, page_size, SortSpec::default()) }

    pub fn with_default_sort(source: S, page_size: usize, default_sort: SortSpec) -> Self {
        Self {
            source,
            cache: PageCache::new(default_sort.clone()),
            default_sort,
            current_page: 1,
            page_size: page_size.max(1),
            stop: None,
        }
    }

    pub fn source(&self) -> &S { &self.source }
    pub fn cache(&self) -> &PageCache<S::Item> { &self.cache }
    pub fn current_page(&self) -> usize { self.current_page }
    pub fn page_size(&self) -> usize { self.page_size }
    pub fn sort(&self) -> &SortSpec { self.cache.sort() }

    /// Unknown before the first fetch. Once the cursor is exhausted the count of
    /// local records is authoritative; before that the store's total is.
    pub fn total_pages(&self) -> Option<usize> {
        if !self.cache.fetched() {
            return None;
        }
        let len = self.cache.len();
        let records = if self.cache.is_exhausted() {
            len
        } else {
            (self.cache.total_count().unwrap_or(0) as usize).max(len)
        };
        Some(records.div_ceil(self.page_size).max(1))
    }

    pub fn current_items(&self) -> &[S::Item] { self.cache.slice_for_page(self.current_page, self.page_size) }

    pub fn can_go_next(&self) -> bool { self.total_pages().is_some_and(|t| self.current_page < t) }
    pub fn can_go_previous(&self) -> bool { self.current_page > 1 }

    /// Install (or clear) the stop signal for the fetches of the next transition.
    /// The sender side must stay alive for as long as the transition runs.
    pub(crate) fn arm(&mut self, stop: Option<oneshot::Receiver<()>>) { self.stop = stop; }

    async fn fetch(&mut self, req: PageRequest) -> KioskResult<Page<S::Item>> {
        debug!(sort = %req.sort, page_size = req.page_size, has_cursor = req.cursor.is_some(), "pager: fetch");
        let fut = self.source.fetch_page(req);
        match self.stop.as_mut() {
            Some(stop) => tokio::select! {
                biased;
                _ = stop => Err(KioskError::Cancelled),
                res = fut => res,
            },
            None => fut.await,
        }
    }

    /// First load with the default sort. Later calls are no-ops.
    pub async fn initial_load(&mut self) -> KioskResult<bool> {
        if self.cache.fetched() {
            return Ok(false);
        }
        let sort = self.default_sort.clone();
        self.apply_sort(sort).await?;
        Ok(true)
    }

    pub async fn change_sort(&mut self, key: &str, order: SortOrder) -> KioskResult<()> {
        let sort = SortSpec::new(key, order)?;
        self.apply_sort(sort).await
    }

    /// Drop everything cached and reload the first page under the current sort.
    pub async fn refresh(&mut self) -> KioskResult<()> {
        let sort = self.cache.sort().clone();
        self.apply_sort(sort).await
    }

    /// Fresh cache for `sort`, first page fetched into it, then swapped in.
    pub async fn apply_sort(&mut self, sort: SortSpec) -> KioskResult<()> {
        let mut fresh = PageCache::new(sort.clone());
        let page = self.fetch(PageRequest::first(sort.clone(), self.page_size)).await?;
        fresh.merge(page.records, page.next_cursor, page.total_count);
        info!(sort = %sort, cached = fresh.len(), total = ?fresh.total_count(), "pager: sort applied");
        self.cache = fresh;
        self.current_page = 1;
        Ok(())
    }

    /// Switch page size, topping the cache up to one full page of the new size
    /// with a single fetch sized to the deficit.
    pub async fn set_page_size(&mut self, page_size: usize) -> KioskResult<()> {
        if page_size == 0 {
            return Err(KioskError::Validation("page size must be > 0".into()));
        }
        if !self.cache.has_page(1, page_size) {
            let deficit = page_size - self.cache.len();
            let req = PageRequest { cursor: self.cache.cursor().cloned(), page_size: deficit, sort: self.cache.sort().clone() };
            let page = self.fetch(req).await?;
            let appended = self.cache.merge(page.records, page.next_cursor, page.total_count);
            debug!(deficit, appended, "pager: page size top-up merged");
        }
        self.page_size = page_size;
        self.current_page = 1;
        Ok(())
    }

    /// Advance one page, fetching from the cursor only when the cache cannot
    /// serve it. Returns `false` when already on the last page.
    pub async fn next_page(&mut self) -> KioskResult<bool> {
        if !self.can_go_next() {
            return Ok(false);
        }
        let target = self.current_page + 1;
        if self.needs_fetch(&self.cache, target) {
            let req = PageRequest {
                cursor: self.cache.cursor().cloned(),
                page_size: self.page_size,
                sort: self.cache.sort().clone(),
            };
            let page = self.fetch(req).await?;
            self.cache.merge(page.records, page.next_cursor, page.total_count);
        }
        Ok(self.settle_on(target))
    }

    /// Step back one page; always served locally.
    pub fn previous_page(&mut self) -> bool {
        if !self.can_go_previous() {
            return false;
        }
        self.current_page -= 1;
        true
    }

    /// Jump to `page`, walking the cursor forward one page at a time until the
    /// page is local or the data runs out.
    pub async fn go_to_page(&mut self, page: usize) -> KioskResult<bool> {
        let Some(total) = self.total_pages() else { return Ok(false) };
        if page == 0 || page > total {
            return Err(KioskError::Validation(format!("page {} out of range 1..={}", page, total)));
        }
        if page == self.current_page {
            return Ok(false);
        }
        let mut staged = self.cache.clone();
        let mut fetched = 0usize;
        while self.needs_fetch(&staged, page) {
            let req = PageRequest { cursor: staged.cursor().cloned(), page_size: self.page_size, sort: staged.sort().clone() };
            let res = self.fetch(req).await?;
            staged.merge(res.records, res.next_cursor, res.total_count);
            fetched += 1;
        }
        if fetched > 0 {
            debug!(page, fetched, "pager: walked forward");
            self.cache = staged;
        }
        Ok(self.settle_on(page))
    }

    fn needs_fetch(&self, cache: &PageCache<S::Item>, page: usize) -> bool {
        !cache.has_page(page, self.page_size)
            && cache.cursor().is_some()
            && cache.total_count().map_or(true, |t| (cache.len() as u64) < t)
    }

    /// Move to `page`, clamped to the pages that actually exist.
    fn settle_on(&mut self, page: usize) -> bool {
        let last = self.total_pages().unwrap_or(1);
        let before = self.current_page;
        self.current_page = page.min(last).max(1);
        self.current_page != before
    }

    // ---- local patching after CRUD (no refetch) ----

    /// Show a newly created record at the end of the displayed page.
    pub fn apply_created(&mut self, record: S::Item) {
        let at = self.current_page * self.page_size;
        self.cache.insert_at(at, record);
    }

    pub fn apply_updated(&mut self, record: S::Item) -> KioskResult<()> {
        let id = record.id().to_string();
        if self.cache.replace(record) {
            Ok(())
        } else {
            Err(KioskError::NotFound(id))
        }
    }

    pub fn apply_deleted(&mut self, id: &str) -> KioskResult<()> {
        self.cache.remove(id).ok_or_else(|| KioskError::NotFound(id.to_string()))?;
        let current = self.current_page;
        self.settle_on(current);
        Ok(())
    }
}
