#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use kiosk_core::{Collection, Document, Fields, KioskResult};
use kiosk_source::{CollectionSource, DocumentStore, MemoryStore, Page, PageRequest, PagedQuerySource};
use tokio::sync::Notify;

/// Products source that counts fetches and can park one fetch until released.
pub struct Probe {
    inner: CollectionSource<MemoryStore>,
    pub calls: AtomicUsize,
    hold_next: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl Probe {
    pub fn new(store: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner: CollectionSource::new(store, Collection::Products),
            calls: AtomicUsize::new(0),
            hold_next: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

    /// Park the next fetch until `release` is notified.
    pub fn hold_next(&self) { self.hold_next.store(true, Ordering::SeqCst) }
}

#[async_trait::async_trait]
impl PagedQuerySource for Probe {
    type Item = Document;

    async fn fetch_page(&self, req: PageRequest) -> KioskResult<Page<Document>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hold_next.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.fetch_page(req).await
    }
}

pub fn fields(v: serde_json::Value) -> Fields { v.as_object().cloned().unwrap_or_default() }

/// Products A..=E priced 1..=5.
pub async fn five_products() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for (i, name) in ["A", "B", "C", "D", "E"].iter().enumerate() {
        store
            .insert(Collection::Products, fields(serde_json::json!({ "name": name, "price": i + 1 })))
            .await
            .expect("seed");
    }
    store
}

pub fn labels(items: &[Document]) -> Vec<String> { items.iter().map(|d| d.label().to_string()).collect() }
