//! In-memory document store. Backs tests and demos; mirrors the ordering,
//! cursor and uniqueness rules of the durable store.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use kiosk_core::{
    now_millis, Collection, Cursor, Document, Fields, KioskError, KioskResult, Record, RecordId, SortSpec, SortValue,
};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{strip_reserved, CursorKey, DocumentStore, ListPage};

#[derive(Default)]
struct MemState {
    docs: FxHashMap<Collection, Vec<Document>>,
    clock: i64,
}

impl MemState {
    /// Strictly increasing store clock (epoch millis).
    fn tick(&mut self) -> i64 {
        self.clock = now_millis().max(self.clock + 1);
        self.clock
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemState>,
    reads: AtomicU64,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Number of billed reads (listings and counts) served so far.
    pub fn reads(&self) -> u64 { self.reads.load(AtomicOrdering::SeqCst) }

    /// Simulate an unreachable store.
    pub fn set_offline(&self, offline: bool) { self.offline.store(offline, AtomicOrdering::SeqCst) }

    fn lock(&self) -> KioskResult<std::sync::MutexGuard<'_, MemState>> {
        self.state.lock().map_err(|_| KioskError::Internal("memory store lock poisoned".into()))
    }

    fn check_online(&self, write: bool) -> KioskResult<()> {
        if !self.offline.load(AtomicOrdering::SeqCst) {
            return Ok(());
        }
        let msg = "store unreachable".to_string();
        Err(if write { KioskError::Mutation(msg) } else { KioskError::Query(msg) })
    }
}

/// Ascending comparison on `(sort value, id)`.
fn position_cmp(a: (&SortValue, &str), b: (&SortValue, &str)) -> Ordering { a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)) }

fn check_unique(collection: Collection, docs: &[Document], fields: &Fields, except: Option<&str>) -> KioskResult<()> {
    for field in collection.spec().unique {
        let Some(value) = fields.get(*field) else { continue };
        let clash = docs.iter().any(|d| Some(d.id.as_str()) != except && d.fields.get(*field) == Some(value));
        if clash {
            return Err(KioskError::Mutation(format!("{} {} must be unique", collection, field)));
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn list_page(
        &self,
        collection: Collection,
        sort: &SortSpec,
        after: Option<&Cursor>,
        limit: usize,
    ) -> KioskResult<ListPage> {
        self.check_online(false)?;
        self.reads.fetch_add(1, AtomicOrdering::SeqCst);
        let after = after.map(|c| CursorKey::decode(c, collection, sort)).transpose()?;
        let st = self.lock()?;
        let mut keyed: Vec<(SortValue, &Document)> = st
            .docs
            .get(&collection)
            .map(|v| v.iter().filter_map(|d| d.sort_value(&sort.key).map(|sv| (sv, d))).collect())
            .unwrap_or_default();
        keyed.sort_by(|a, b| sort.order.apply(position_cmp((&a.0, a.1.id.as_str()), (&b.0, b.1.id.as_str()))));
        let docs: Vec<Document> = keyed
            .iter()
            .filter(|(sv, d)| match &after {
                Some(k) => sort.order.apply(position_cmp((sv, d.id.as_str()), (&k.value, k.id.as_str()))) == Ordering::Greater,
                None => true,
            })
            .take(limit)
            .map(|(_, d)| (*d).clone())
            .collect();
        let last = docs
            .last()
            .and_then(|d| d.sort_value(&sort.key).map(|sv| CursorKey::new(collection, sort, sv, &d.id).encode()));
        debug!(collection = %collection, returned = docs.len(), "memory: list_page");
        Ok(ListPage { docs, last })
    }

    async fn count(&self, collection: Collection) -> KioskResult<u64> {
        self.check_online(false)?;
        self.reads.fetch_add(1, AtomicOrdering::SeqCst);
        let st = self.lock()?;
        Ok(st.docs.get(&collection).map(|v| v.len() as u64).unwrap_or(0))
    }

    async fn get(&self, collection: Collection, id: &str) -> KioskResult<Document> {
        self.check_online(false)?;
        let st = self.lock()?;
        st.docs
            .get(&collection)
            .and_then(|v| v.iter().find(|d| d.id == id))
            .cloned()
            .ok_or_else(|| KioskError::NotFound(format!("{}/{}", collection, id)))
    }

    async fn insert(&self, collection: Collection, fields: Fields) -> KioskResult<Document> {
        self.check_online(true)?;
        let fields = strip_reserved(fields);
        let mut st = self.lock()?;
        check_unique(collection, st.docs.get(&collection).map(|v| v.as_slice()).unwrap_or(&[]), &fields, None)?;
        let ts = st.tick();
        let doc = Document { id: uuid::Uuid::new_v4().simple().to_string(), created_at: ts, updated_at: ts, fields };
        st.docs.entry(collection).or_default().push(doc.clone());
        Ok(doc)
    }

    async fn update(&self, collection: Collection, id: &str, fields: Fields) -> KioskResult<Document> {
        self.check_online(true)?;
        let fields = strip_reserved(fields);
        let mut st = self.lock()?;
        let docs = st.docs.get(&collection).map(|v| v.as_slice()).unwrap_or(&[]);
        let idx = docs
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| KioskError::NotFound(format!("{}/{}", collection, id)))?;
        check_unique(collection, docs, &fields, Some(id))?;
        let ts = st.tick();
        let doc = &mut st.docs.entry(collection).or_default()[idx];
        doc.fields.extend(fields);
        doc.updated_at = ts;
        Ok(doc.clone())
    }

    async fn delete(&self, collection: Collection, id: &str) -> KioskResult<RecordId> {
        self.check_online(true)?;
        let mut st = self.lock()?;
        let docs = st.docs.entry(collection).or_default();
        let idx = docs
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| KioskError::NotFound(format!("{}/{}", collection, id)))?;
        docs.remove(idx);
        Ok(id.to_string())
    }
}
