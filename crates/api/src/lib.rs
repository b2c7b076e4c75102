//! Kiosk public API façade (in-process).
//!
//! This crate defines the surface frontends (CLI, screens) depend on: session
//! handling, list views per collection, and runtime settings.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use kiosk_core::Collection;
use kiosk_source::DocumentStore;
use serde::{Deserialize, Serialize};
use tracing::info;

pub mod auth;
pub mod config;
pub mod view;

pub use auth::{require_admin, AuthService, MemoryAuth, User};
pub use config::Settings;
pub use kiosk_core::{KioskError, KioskResult};
pub use view::{ListView, ListViewState};

/// Per-collection document counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Stats {
    pub counts: Vec<(Collection, u64)>,
}

/// Declarative Kiosk API surface.
#[async_trait::async_trait]
pub trait KioskApi: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> KioskResult<User>;

    async fn sign_out(&self) -> KioskResult<()>;

    fn current_user(&self) -> Option<User>;

    /// Open a list over `collection` and load its first page.
    async fn open_list(&self, collection: Collection) -> KioskResult<Arc<ListView>>;

    /// Document counts for every collection.
    async fn stats(&self) -> KioskResult<Stats>;

    fn settings(&self) -> &Settings;
}

/// In-process implementation over a document store and an auth service.
pub struct InProcApi {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthService>,
    settings: Settings,
}

impl InProcApi {
    pub fn new(store: Arc<dyn DocumentStore>, auth: Arc<dyn AuthService>, settings: Settings) -> Self {
        Self { store, auth, settings }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> { &self.store }
}

#[async_trait::async_trait]
impl KioskApi for InProcApi {
    async fn sign_in(&self, email: &str, password: &str) -> KioskResult<User> { self.auth.sign_in(email, password).await }

    async fn sign_out(&self) -> KioskResult<()> { self.auth.sign_out().await }

    fn current_user(&self) -> Option<User> { self.auth.current_user() }

    async fn open_list(&self, collection: Collection) -> KioskResult<Arc<ListView>> {
        let t0 = Instant::now();
        let session = self.auth.subscribe();
        require_admin(&session)?;
        let view = Arc::new(ListView::new(
            self.store.clone(),
            collection,
            &self.settings.page_sizes,
            self.settings.default_sort.clone(),
            session,
        ));
        view.load().await?;
        let st = view.state();
        info!(
            collection = %collection,
            items = st.current_page_items.len(),
            total = ?st.total_count,
            took_ms = %t0.elapsed().as_millis(),
            "api: list opened"
        );
        Ok(view)
    }

    async fn stats(&self) -> KioskResult<Stats> {
        let t0 = Instant::now();
        require_admin(&self.auth.subscribe())?;
        let mut counts = Vec::with_capacity(Collection::ALL.len());
        for c in Collection::ALL {
            counts.push((c, self.store.count(c).await?));
        }
        info!(took_ms = %t0.elapsed().as_millis(), "api: stats ready");
        Ok(Stats { counts })
    }

    fn settings(&self) -> &Settings { &self.settings }
}
