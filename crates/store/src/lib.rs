//! Kiosk store: page cache, pagination controller, and the shared pager handle
//! list views drive.

#![forbid(unsafe_code)]

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use kiosk_core::{KioskError, KioskResult, SortOrder, SortSpec};
use kiosk_source::PagedQuerySource;
use metrics::counter;
use serde::Serialize;
use tokio::sync::{oneshot, watch, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub mod cache;
pub mod controller;

pub use cache::PageCache;
pub use controller::PaginationController;

/// What readers render: the current page plus navigation and status.
#[derive(Debug, Clone, Serialize)]
pub struct PageView<R> {
    /// Sequence number of the transition that produced this view.
    pub seq: u64,
    pub items: Vec<R>,
    pub current_page: usize,
    pub page_size: usize,
    pub total_pages: Option<usize>,
    pub total_count: Option<u64>,
    /// Records held locally for the current sort.
    pub cached: usize,
    pub sort: SortSpec,
    pub loading: bool,
    pub error: Option<String>,
}

impl<R> PageView<R> {
    fn empty(sort: SortSpec, page_size: usize) -> Self {
        Self {
            seq: 0,
            items: Vec::new(),
            current_page: 1,
            page_size,
            total_pages: None,
            total_count: None,
            cached: 0,
            sort,
            loading: false,
            error: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Admission {
    /// Fail with `Busy` while another transition runs.
    Reject,
    /// Stop the running transition's fetch and queue behind it.
    Supersede,
}

/// Shared handle serializing transitions on one `PaginationController`.
///
/// Navigation (next/previous/go-to) is rejected while a transition is in
/// flight. Sort and page-size changes supersede: the in-flight fetch is told to
/// stop and returns `Cancelled` without touching state. Views are published
/// lock-free; subscribe to the epoch channel for re-render triggers.
pub struct Pager<S: PagedQuerySource> {
    ctrl: Mutex<PaginationController<S>>,
    inflight: std::sync::Mutex<Option<oneshot::Sender<()>>>,
    seq: AtomicU64,
    view: ArcSwap<PageView<S::Item>>,
    epoch_tx: watch::Sender<u64>,
    epoch_rx: watch::Receiver<u64>,
}

impl<S: PagedQuerySource> Pager<S> {
    pub fn new(ctrl: PaginationController<S>) -> Self {
        let view = PageView::empty(ctrl.sort().clone(), ctrl.page_size());
        let (epoch_tx, epoch_rx) = watch::channel(0u64);
        Self {
            ctrl: Mutex::new(ctrl),
            inflight: std::sync::Mutex::new(None),
            seq: AtomicU64::new(0),
            view: ArcSwap::from_pointee(view),
            epoch_tx,
            epoch_rx,
        }
    }

    pub fn current(&self) -> Arc<PageView<S::Item>> { self.view.load_full() }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }

    /// Take the pending error, if any; each failure is reported once.
    pub fn take_error(&self) -> Option<String> {
        let prev = self.view.rcu(|v| {
            let mut next = (**v).clone();
            next.error = None;
            next
        });
        prev.error.clone()
    }

    /// Surface a failure that happened outside a transition (a CRUD call).
    pub fn report_error(&self, err: &KioskError) {
        if !err.is_user_visible() {
            return;
        }
        let msg = err.to_string();
        let prev = self.view.rcu(|v| {
            let mut next = (**v).clone();
            next.error = Some(msg.clone());
            next
        });
        let _ = self.epoch_tx.send(prev.seq);
    }

    pub async fn initial_load(&self) -> KioskResult<bool> {
        let t0 = Instant::now();
        let mut tx = self.admit(Admission::Supersede).await?;
        let res = tx.initial_load().await;
        tx.finish("initial_load", t0, res)
    }

    pub async fn change_sort(&self, key: &str, order: SortOrder) -> KioskResult<()> {
        let t0 = Instant::now();
        let mut tx = self.admit(Admission::Supersede).await?;
        let res = tx.change_sort(key, order).await;
        tx.finish("change_sort", t0, res)
    }

    pub async fn set_page_size(&self, page_size: usize) -> KioskResult<()> {
        let t0 = Instant::now();
        let mut tx = self.admit(Admission::Supersede).await?;
        let res = tx.set_page_size(page_size).await;
        tx.finish("set_page_size", t0, res)
    }

    pub async fn refresh(&self) -> KioskResult<()> {
        let t0 = Instant::now();
        let mut tx = self.admit(Admission::Supersede).await?;
        let res = tx.refresh().await;
        tx.finish("refresh", t0, res)
    }

    pub async fn next_page(&self) -> KioskResult<bool> {
        let t0 = Instant::now();
        let mut tx = self.admit(Admission::Reject).await?;
        let res = tx.next_page().await;
        tx.finish("next_page", t0, res)
    }

    pub async fn previous_page(&self) -> KioskResult<bool> {
        let t0 = Instant::now();
        let mut tx = self.admit(Admission::Reject).await?;
        let moved = tx.previous_page();
        tx.finish("previous_page", t0, Ok(moved))
    }

    pub async fn go_to_page(&self, page: usize) -> KioskResult<bool> {
        let t0 = Instant::now();
        let mut tx = self.admit(Admission::Reject).await?;
        let res = tx.go_to_page(page).await;
        tx.finish("go_to_page", t0, res)
    }

    /// Apply a local, fetch-free change (CRUD patching) and publish the result.
    pub async fn patch<T>(&self, f: impl FnOnce(&mut PaginationController<S>) -> KioskResult<T>) -> KioskResult<T> {
        let mut ctrl = self.ctrl.lock().await;
        let seq = self.next_seq();
        let res = f(&mut ctrl);
        if res.is_ok() {
            self.publish(seq, &ctrl, false, None);
        }
        res
    }

    /// Read controller state without publishing.
    pub async fn inspect<T>(&self, f: impl FnOnce(&PaginationController<S>) -> T) -> T {
        let ctrl = self.ctrl.lock().await;
        f(&ctrl)
    }

    fn next_seq(&self) -> u64 { self.seq.fetch_add(1, Ordering::SeqCst) + 1 }

    fn inflight_slot(&self) -> KioskResult<std::sync::MutexGuard<'_, Option<oneshot::Sender<()>>>> {
        self.inflight.lock().map_err(|_| KioskError::Internal("pager in-flight slot poisoned".into()))
    }

    async fn admit(&self, mode: Admission) -> KioskResult<Transition<'_, S>> {
        let mut ctrl = match mode {
            Admission::Reject => self.ctrl.try_lock().map_err(|_| {
                counter!("kiosk_transition_rejected_total", 1u64);
                KioskError::Busy("a page transition is already in flight".into())
            })?,
            Admission::Supersede => {
                let prev = self.inflight_slot()?.take();
                if let Some(stop) = prev {
                    debug!("pager: superseding in-flight transition");
                    let _ = stop.send(());
                }
                self.ctrl.lock().await
            }
        };
        let seq = self.next_seq();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        *self.inflight_slot()? = Some(stop_tx);
        ctrl.arm(Some(stop_rx));
        let pending = self.view.load().error.clone();
        self.publish(seq, &ctrl, true, pending);
        Ok(Transition { pager: self, ctrl, seq, settled: false })
    }

    /// Store a view built from `ctrl` unless a newer one is already out.
    fn publish(&self, seq: u64, ctrl: &PaginationController<S>, loading: bool, error: Option<String>) {
        let view = Arc::new(PageView {
            seq,
            items: ctrl.current_items().to_vec(),
            current_page: ctrl.current_page(),
            page_size: ctrl.page_size(),
            total_pages: ctrl.total_pages(),
            total_count: ctrl.cache().total_count(),
            cached: ctrl.cache().len(),
            sort: ctrl.sort().clone(),
            loading,
            error,
        });
        let prev = self.view.rcu(|cur| {
            if seq < cur.seq {
                return Arc::clone(cur);
            }
            // Keep a failure nobody has taken yet
            if view.error.is_none() && cur.error.is_some() && cur.seq == seq {
                let mut merged = (*view).clone();
                merged.error = cur.error.clone();
                return Arc::new(merged);
            }
            Arc::clone(&view)
        });
        if seq < prev.seq {
            debug!(seq, "pager: dropping stale view");
            return;
        }
        let _ = self.epoch_tx.send(seq);
    }
}

/// An admitted transition holding the controller lock.
///
/// Settles the published view on every exit: `finish` on completion, `Drop`
/// when the caller abandons the future mid-fetch.
struct Transition<'a, S: PagedQuerySource> {
    pager: &'a Pager<S>,
    ctrl: MutexGuard<'a, PaginationController<S>>,
    seq: u64,
    settled: bool,
}

impl<S: PagedQuerySource> Deref for Transition<'_, S> {
    type Target = PaginationController<S>;

    fn deref(&self) -> &Self::Target { &self.ctrl }
}

impl<S: PagedQuerySource> DerefMut for Transition<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.ctrl }
}

impl<S: PagedQuerySource> Transition<'_, S> {
    fn release(&mut self) {
        self.settled = true;
        self.ctrl.arm(None);
        if let Ok(mut slot) = self.pager.inflight.lock() {
            *slot = None;
        }
    }

    fn finish<T>(mut self, op: &'static str, t0: Instant, res: KioskResult<T>) -> KioskResult<T> {
        self.release();
        let (pager, seq) = (self.pager, self.seq);
        let took_ms = t0.elapsed().as_millis();
        match &res {
            Ok(_) => {
                pager.publish(seq, &self.ctrl, false, None);
                counter!("kiosk_transition_total", 1u64, "op" => op, "outcome" => "ok");
                info!(op, seq, page = self.ctrl.current_page(), page_size = self.ctrl.page_size(), cached = self.ctrl.cache().len(), took_ms = %took_ms, "pager: transition ok");
            }
            Err(KioskError::Cancelled) => {
                // Superseded: clear the loading flag; the next transition republishes
                let pending = pager.view.load().error.clone();
                pager.publish(seq, &self.ctrl, false, pending);
                counter!("kiosk_transition_total", 1u64, "op" => op, "outcome" => "cancelled");
                debug!(op, seq, took_ms = %took_ms, "pager: transition cancelled");
            }
            Err(e) => {
                pager.publish(seq, &self.ctrl, false, Some(e.to_string()));
                counter!("kiosk_transition_total", 1u64, "op" => op, "outcome" => "error");
                warn!(op, seq, error = %e, took_ms = %took_ms, "pager: transition failed");
            }
        }
        res
    }
}

impl<S: PagedQuerySource> Drop for Transition<'_, S> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.release();
        let error = self.pager.view.load().error.clone();
        self.pager.publish(self.seq, &self.ctrl, false, error);
        counter!("kiosk_transition_total", 1u64, "op" => "abandoned", "outcome" => "cancelled");
        debug!(seq = self.seq, "pager: transition abandoned");
    }
}
