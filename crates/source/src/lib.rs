//! Kiosk sources: the remote document store boundary and the cursor-paged
//! query contract the pagination engine consumes.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use kiosk_core::{Collection, Cursor, Document, Fields, KioskError, KioskResult, Record, RecordId, SortSpec};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub mod cursor;
pub mod memory;

pub use cursor::CursorKey;
pub use memory::MemoryStore;

/// One cursor-paged query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Continue after this position; `None` starts from the beginning.
    pub cursor: Option<Cursor>,
    pub page_size: usize,
    pub sort: SortSpec,
}

impl PageRequest {
    pub fn first(sort: SortSpec, page_size: usize) -> Self { Self { cursor: None, page_size, sort } }
}

/// Result of a paged query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<R> {
    pub records: Vec<R>,
    /// `None` iff fewer than `page_size` records came back (end of collection).
    pub next_cursor: Option<Cursor>,
    /// Full collection size at the time of the call.
    pub total_count: u64,
}

/// Cursor-paged, sortable query over one collection.
#[async_trait::async_trait]
pub trait PagedQuerySource: Send + Sync {
    type Item: Record;

    /// Fetch up to `req.page_size` records after `req.cursor`, sorted per `req.sort`.
    ///
    /// Fails with `KioskError::Query` when the store is unreachable, the sort
    /// field is not orderable, or the cursor was minted under another sort.
    async fn fetch_page(&self, req: PageRequest) -> KioskResult<Page<Self::Item>>;
}

#[async_trait::async_trait]
impl<S: PagedQuerySource> PagedQuerySource for Arc<S> {
    type Item = S::Item;

    async fn fetch_page(&self, req: PageRequest) -> KioskResult<Page<Self::Item>> { (**self).fetch_page(req).await }
}

/// Raw listing returned by a document store.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub docs: Vec<Document>,
    /// Position after the last returned document; `None` when `docs` is empty.
    pub last: Option<Cursor>,
}

/// Remote document store boundary, addressed per collection.
///
/// Stores stamp `createdAt` on insert and `updatedAt` on insert and update.
/// Documents lacking the sort field are left out of ordered listings, while
/// `count` counts every document.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_page(
        &self,
        collection: Collection,
        sort: &SortSpec,
        after: Option<&Cursor>,
        limit: usize,
    ) -> KioskResult<ListPage>;

    async fn count(&self, collection: Collection) -> KioskResult<u64>;

    async fn get(&self, collection: Collection, id: &str) -> KioskResult<Document>;

    /// Insert a new document; fails with `Mutation` on a uniqueness violation.
    async fn insert(&self, collection: Collection, fields: Fields) -> KioskResult<Document>;

    /// Merge `fields` into an existing document.
    async fn update(&self, collection: Collection, id: &str, fields: Fields) -> KioskResult<Document>;

    async fn delete(&self, collection: Collection, id: &str) -> KioskResult<RecordId>;
}

/// Drop keys the store owns from a caller-supplied payload.
pub fn strip_reserved(mut fields: Fields) -> Fields {
    fields.remove("id");
    fields.remove(kiosk_core::CREATED_AT);
    fields.remove(kiosk_core::UPDATED_AT);
    fields
}

/// Paged query source over one collection of a document store.
pub struct CollectionSource<D: ?Sized> {
    store: Arc<D>,
    collection: Collection,
}

impl<D: DocumentStore + ?Sized> CollectionSource<D> {
    pub fn new(store: Arc<D>, collection: Collection) -> Self { Self { store, collection } }

    pub fn collection(&self) -> Collection { self.collection }

    pub fn store(&self) -> &Arc<D> { &self.store }

    pub async fn create(&self, fields: Fields) -> KioskResult<Document> {
        let t0 = Instant::now();
        let doc = self.store.insert(self.collection, strip_reserved(fields)).await?;
        info!(collection = %self.collection, id = %doc.id, took_ms = %t0.elapsed().as_millis(), "source: create ok");
        Ok(doc)
    }

    pub async fn update(&self, id: &str, fields: Fields) -> KioskResult<Document> {
        let t0 = Instant::now();
        let doc = self.store.update(self.collection, id, strip_reserved(fields)).await?;
        info!(collection = %self.collection, id = %id, took_ms = %t0.elapsed().as_millis(), "source: update ok");
        Ok(doc)
    }

    pub async fn delete(&self, id: &str) -> KioskResult<RecordId> {
        let t0 = Instant::now();
        let id = self.store.delete(self.collection, id).await?;
        info!(collection = %self.collection, id = %id, took_ms = %t0.elapsed().as_millis(), "source: delete ok");
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> KioskResult<Document> { self.store.get(self.collection, id).await }

    pub async fn count(&self) -> KioskResult<u64> { self.store.count(self.collection).await }
}

#[async_trait::async_trait]
impl<D: DocumentStore + ?Sized> PagedQuerySource for CollectionSource<D> {
    type Item = Document;

    async fn fetch_page(&self, req: PageRequest) -> KioskResult<Page<Document>> {
        let t0 = Instant::now();
        if req.page_size == 0 {
            return Err(KioskError::Validation("page size must be > 0".into()));
        }
        if !self.collection.spec().is_orderable(&req.sort.key) {
            return Err(KioskError::Query(format!("{} is not orderable on {}", req.sort.key, self.collection)));
        }
        debug!(collection = %self.collection, sort = %req.sort, page_size = req.page_size, has_cursor = req.cursor.is_some(), "source: fetch_page start");
        let listed = self.store.list_page(self.collection, &req.sort, req.cursor.as_ref(), req.page_size).await?;
        // Count is not cached; it reflects the collection at call time
        let total_count = self.store.count(self.collection).await?;
        let next_cursor = if listed.docs.len() < req.page_size { None } else { listed.last };
        counter!("kiosk_fetch_total", 1u64, "collection" => self.collection.name());
        histogram!("kiosk_fetch_ms", t0.elapsed().as_secs_f64() * 1000.0, "collection" => self.collection.name());
        info!(
            collection = %self.collection,
            records = listed.docs.len(),
            total_count,
            more = next_cursor.is_some(),
            took_ms = %t0.elapsed().as_millis(),
            "source: fetch_page ok"
        );
        Ok(Page { records: listed.docs, next_cursor, total_count })
    }
}
