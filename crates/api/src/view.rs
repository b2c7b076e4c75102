//! List-view integration: what a list screen supplies (page sizes, sort
//! options, change handlers) and what it receives (the current page and its
//! status), plus the CRUD side-channel that patches the page locally.

use std::sync::Arc;
use std::time::Instant;

use kiosk_core::{Collection, Document, Fields, KioskError, KioskResult, RecordId, SortOption, SortSpec};
use kiosk_source::{CollectionSource, DocumentStore};
use kiosk_store::{PageView, PaginationController, Pager};
use serde::Serialize;
use smallvec::SmallVec;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::auth::{require_admin, User};

pub type DocSource = Arc<CollectionSource<dyn DocumentStore>>;

/// Everything a list screen renders.
#[derive(Debug, Clone, Serialize)]
pub struct ListViewState {
    pub current_page_items: Vec<Document>,
    pub loading: bool,
    pub error: Option<String>,
    pub current_page: usize,
    pub total_pages: Option<usize>,
    pub total_count: Option<u64>,
    pub page_size: usize,
    /// Combined `field-direction` key of the active sort.
    pub sort: String,
}

impl From<&PageView<Document>> for ListViewState {
    fn from(v: &PageView<Document>) -> Self {
        Self {
            current_page_items: v.items.clone(),
            loading: v.loading,
            error: v.error.clone(),
            current_page: v.current_page,
            total_pages: v.total_pages,
            total_count: v.total_count,
            page_size: v.page_size,
            sort: v.sort.combined(),
        }
    }
}

/// One entity list bound to a collection; lives as long as its screen.
pub struct ListView {
    source: DocSource,
    pager: Pager<DocSource>,
    page_size_options: SmallVec<[usize; 4]>,
    session: watch::Receiver<Option<User>>,
}

impl ListView {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collection: Collection,
        page_size_options: &[usize],
        default_sort: SortSpec,
        session: watch::Receiver<Option<User>>,
    ) -> Self {
        let source: DocSource = Arc::new(CollectionSource::new(store, collection));
        let page_size_options: SmallVec<[usize; 4]> = page_size_options.iter().copied().filter(|n| *n > 0).collect();
        let initial = page_size_options.first().copied().unwrap_or(crate::config::DEFAULT_PAGE_SIZES[0]);
        let default_sort = if collection.spec().is_orderable(&default_sort.key) { default_sort } else { SortSpec::default() };
        let ctrl = PaginationController::with_default_sort(source.clone(), initial, default_sort);
        Self { source, pager: Pager::new(ctrl), page_size_options, session }
    }

    pub fn collection(&self) -> Collection { self.source.collection() }

    pub fn page_size_options(&self) -> &[usize] { &self.page_size_options }

    pub fn sort_options(&self) -> &'static [SortOption] { self.collection().spec().sort_options }

    pub fn state(&self) -> ListViewState { ListViewState::from(self.pager.current().as_ref()) }

    /// Take the pending error for display; each failure is handed out once.
    pub fn take_error(&self) -> Option<String> { self.pager.take_error() }

    /// Re-render trigger: bumps whenever a new state is published.
    pub fn subscribe(&self) -> watch::Receiver<u64> { self.pager.subscribe_epoch() }

    pub fn pager(&self) -> &Pager<DocSource> { &self.pager }

    fn gate(&self) -> KioskResult<User> { require_admin(&self.session) }

    pub async fn load(&self) -> KioskResult<()> {
        self.gate()?;
        self.pager.initial_load().await.map(|_| ())
    }

    /// `combined` is a sort selector key such as `price-asc`.
    pub async fn on_sort_change(&self, combined: &str) -> KioskResult<()> {
        self.gate()?;
        let option = self
            .collection()
            .spec()
            .sort_option(combined)
            .ok_or_else(|| KioskError::Validation(format!("unknown sort option {} for {}", combined, self.collection())))?;
        let sort = SortSpec::parse(option.key)?;
        self.pager.change_sort(&sort.key, sort.order).await
    }

    pub async fn on_page_size_change(&self, size: usize) -> KioskResult<()> {
        self.gate()?;
        if !self.page_size_options.contains(&size) {
            return Err(KioskError::Validation(format!("page size {} not offered", size)));
        }
        self.pager.set_page_size(size).await
    }

    pub async fn next_page(&self) -> KioskResult<bool> {
        self.gate()?;
        self.pager.next_page().await
    }

    pub async fn previous_page(&self) -> KioskResult<bool> {
        self.gate()?;
        self.pager.previous_page().await
    }

    pub async fn go_to_page(&self, page: usize) -> KioskResult<bool> {
        self.gate()?;
        self.pager.go_to_page(page).await
    }

    pub async fn refresh(&self) -> KioskResult<()> {
        self.gate()?;
        self.pager.refresh().await
    }

    // ---- CRUD side-channel ----

    pub async fn create(&self, fields: Fields) -> KioskResult<Document> {
        self.gate()?;
        let t0 = Instant::now();
        let doc = self.surface(self.source.create(fields).await)?;
        let shown = doc.clone();
        self.pager
            .patch(move |pc| {
                pc.apply_created(shown);
                Ok(())
            })
            .await?;
        info!(collection = %self.collection(), id = %doc.id, took_ms = %t0.elapsed().as_millis(), "view: created");
        Ok(doc)
    }

    pub async fn update(&self, id: &str, fields: Fields) -> KioskResult<Document> {
        self.gate()?;
        self.surface(self.ensure_listed(id).await)?;
        let doc = self.surface(self.source.update(id, fields).await)?;
        let shown = doc.clone();
        self.surface(self.pager.patch(move |pc| pc.apply_updated(shown)).await)?;
        Ok(doc)
    }

    pub async fn delete(&self, id: &str) -> KioskResult<RecordId> {
        self.gate()?;
        self.surface(self.ensure_listed(id).await)?;
        let removed = self.surface(self.source.delete(id).await)?;
        self.surface(self.pager.patch(|pc| pc.apply_deleted(&removed)).await)?;
        Ok(removed)
    }

    /// Updates and deletes only target records this view has loaded.
    async fn ensure_listed(&self, id: &str) -> KioskResult<()> {
        if self.pager.inspect(|pc| pc.cache().contains(id)).await {
            Ok(())
        } else {
            Err(KioskError::NotFound(format!("{}/{}", self.collection(), id)))
        }
    }

    fn surface<T>(&self, res: KioskResult<T>) -> KioskResult<T> {
        if let Err(e) = &res {
            warn!(collection = %self.collection(), error = %e, "view: operation failed");
            self.pager.report_error(e);
        }
        res
    }
}
