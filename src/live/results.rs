//! QueryResults — the pagination/fetch engine.
//!
//! Owns one data subscription and (in traditional mode) one count
//! subscription at a time, dispatches reducer actions as emissions arrive,
//! and exposes the pagination controls. Establishing a new subscription for
//! a concern always tears down the prior one first; promise-form lookups in
//! flight are additionally latched off via [`cancelable`] so a late
//! resolution is dropped rather than applied.
//!
//! No internal lock is ever held while a collaborator operation or a
//! consumer callback runs.

use std::sync::Arc;

use parking_lot::Mutex;

use super::state::{Action, FetchState, Pagination, PaginationMode, ResultDocs, reduce};
use crate::cancelable::{CancelToken, cancelable};
use crate::db::query::{DocQuery, QuerySpec, SortEntry};
use crate::db::Document;
use crate::emitter::{Broadcast, Unsubscribe};
use crate::error::LiveQueryError;

// ============================================================================
// Options
// ============================================================================

/// Engine configuration, fixed for the engine's lifetime.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Page size; `None` (or zero) disables pagination.
    pub page_size: Option<usize>,
    /// Pagination strategy when a page size is set.
    pub pagination: Pagination,
    /// 1-based first page in traditional mode.
    pub starting_page: Option<usize>,
    /// Engine-level sort, applied over the attached query's own sort.
    pub sort: Option<SortEntry>,
    /// Convert documents to plain snapshots in every result window.
    pub json: bool,
}

// ============================================================================
// QueryResults
// ============================================================================

/// Live, paginated results of one attached query.
///
/// Dropping the handle tears down every subscription and cancels any lookup
/// in flight. Promise-form queries are driven on a spawned tokio task, so
/// they must be attached from within a runtime; observable queries have no
/// such requirement.
pub struct QueryResults {
    inner: Arc<EngineInner>,
}

struct SubSlots {
    query: Option<DocQuery>,
    data: Option<Unsubscribe>,
    count: Option<Unsubscribe>,
    cancel: Option<CancelToken>,
    task: Option<tokio::task::JoinHandle<()>>,
    /// Bumped on every teardown of the concern; a subscribe that observes a
    /// stale epoch on return discards its own registration. This closes the
    /// reentrancy window where a synchronous emission triggers a
    /// resubscribe while the outer subscribe is still in flight.
    data_epoch: u64,
    count_epoch: u64,
}

struct EngineInner {
    mode: PaginationMode,
    page_size: usize,
    json: bool,
    sort: Option<SortEntry>,
    state: Mutex<FetchState>,
    slots: Mutex<SubSlots>,
    changes: Broadcast<FetchState>,
    errors: Broadcast<LiveQueryError>,
}

impl QueryResults {
    pub fn new(options: QueryOptions) -> Self {
        let page_size = options.page_size.filter(|n| *n > 0);
        let mode = PaginationMode::derive(options.pagination, page_size);
        let starting_page = options.starting_page.unwrap_or(1).max(1);
        Self {
            inner: Arc::new(EngineInner {
                mode,
                page_size: page_size.unwrap_or(0),
                json: options.json,
                sort: options.sort,
                state: Mutex::new(FetchState::initial(mode, starting_page, options.json)),
                slots: Mutex::new(SubSlots {
                    query: None,
                    data: None,
                    count: None,
                    cancel: None,
                    task: None,
                    data_epoch: 0,
                    count_epoch: 0,
                }),
                changes: Broadcast::new(),
                errors: Broadcast::new(),
            }),
        }
    }

    /// Attach a query (or detach with `None`).
    ///
    /// Tears down the previous subscriptions for both concerns first. With a
    /// query present, marks the state as fetching — keeping the previous
    /// result window — and subscribes; with `None`, the engine waits in its
    /// current state until a query arrives.
    pub fn set_query(&self, query: Option<DocQuery>) {
        let inner = &self.inner;
        inner.teardown_data();
        inner.teardown_count();
        inner.slots.lock().query = query;

        if inner.slots.lock().query.is_none() {
            return;
        }
        inner.dispatch(Action::QueryChanged);
        inner.subscribe_data();
        inner.subscribe_count();
    }

    /// Snapshot of the current render state.
    pub fn state(&self) -> FetchState {
        self.inner.state.lock().clone()
    }

    /// Snapshot of the current result window.
    pub fn result(&self) -> ResultDocs {
        self.inner.state.lock().result.clone()
    }

    /// Grow the window by one page (infinite mode).
    ///
    /// No-op outside infinite mode, while a fetch is in progress, or once
    /// the result set is exhausted.
    pub fn fetch_more(&self) {
        let inner = &self.inner;
        if inner.mode != PaginationMode::Infinite {
            return;
        }
        {
            let state = inner.state.lock();
            if state.is_fetching || state.is_exhausted {
                return;
            }
        }
        inner.dispatch(Action::FetchMore);
        inner.resubscribe_data();
    }

    /// Jump to `page` (traditional mode).
    ///
    /// No-op outside traditional mode or when `page` falls outside
    /// `1..=page_count`.
    pub fn fetch_page(&self, page: usize) {
        let inner = &self.inner;
        if inner.mode != PaginationMode::Traditional {
            return;
        }
        {
            let state = inner.state.lock();
            if page < 1 || page > state.page_count {
                return;
            }
        }
        inner.dispatch(Action::FetchPage(page));
        inner.resubscribe_data();
    }

    /// Return to page 1 with an empty window (infinite mode).
    ///
    /// No-op outside infinite mode or when already on page 1.
    pub fn reset(&self) {
        let inner = &self.inner;
        if inner.mode != PaginationMode::Infinite {
            return;
        }
        if inner.state.lock().page == Some(1) {
            return;
        }
        inner.dispatch(Action::Reset);
        inner.resubscribe_data();
    }

    /// Subscribe to state changes. Dispatches that leave the state
    /// unchanged emit nothing.
    pub fn on_change(&self, callback: impl Fn(&FetchState) + Send + Sync + 'static) -> Unsubscribe {
        self.inner.changes.on(callback)
    }

    /// Subscribe to lookup errors from the promise-form path. The fetch
    /// state is left untouched by errors.
    pub fn on_error(
        &self,
        callback: impl Fn(&LiveQueryError) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.inner.errors.on(callback)
    }
}

impl Drop for QueryResults {
    fn drop(&mut self) {
        self.inner.teardown_data();
        self.inner.teardown_count();
    }
}

// ============================================================================
// Engine internals
// ============================================================================

impl EngineInner {
    /// Apply `action` and notify listeners if the state actually changed.
    fn dispatch(&self, action: Action) -> bool {
        let changed = {
            let mut state = self.state.lock();
            let next = reduce(&state, action);
            if *state == next {
                None
            } else {
                *state = next.clone();
                Some(next)
            }
        };
        match changed {
            Some(next) => {
                self.changes.emit(&next);
                true
            }
            None => false,
        }
    }

    fn teardown_data(&self) {
        let (unsub, cancel, task) = {
            let mut slots = self.slots.lock();
            slots.data_epoch += 1;
            (slots.data.take(), slots.cancel.take(), slots.task.take())
        };
        if let Some(unsub) = unsub {
            unsub();
        }
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(task) = task {
            task.abort();
        }
    }

    fn teardown_count(&self) {
        let unsub = {
            let mut slots = self.slots.lock();
            slots.count_epoch += 1;
            slots.count.take()
        };
        if let Some(unsub) = unsub {
            unsub();
        }
    }

    fn resubscribe_data(self: &Arc<Self>) {
        self.teardown_data();
        self.subscribe_data();
    }

    /// Establish the data subscription for the currently attached query and
    /// the current page.
    fn subscribe_data(self: &Arc<Self>) {
        let (query, epoch) = {
            let slots = self.slots.lock();
            (slots.query.clone(), slots.data_epoch)
        };

        match query {
            None => {}
            Some(DocQuery::Observable { collection, spec }) => {
                let bounded = self.bounded_spec(spec);
                let weak = Arc::downgrade(self);
                let unsub = collection.observe(
                    bounded,
                    Arc::new(move |emission| {
                        if let Some(engine) = weak.upgrade() {
                            engine.apply_docs(emission.to_docs());
                        }
                    }),
                );
                let mut slots = self.slots.lock();
                if slots.data_epoch == epoch {
                    slots.data = Some(unsub);
                } else {
                    // A reentrant resubscribe superseded this registration.
                    drop(slots);
                    unsub();
                }
            }
            Some(DocQuery::Promise(lookup)) => {
                let (wrapped, token) = cancelable(lookup);
                let weak = Arc::downgrade(self);
                let task = tokio::spawn(async move {
                    match wrapped.await {
                        Ok(outcome) => {
                            if let Some(engine) = weak.upgrade() {
                                engine.apply_docs(outcome.into_docs());
                            }
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "id lookup failed");
                            if let Some(engine) = weak.upgrade() {
                                engine.errors.emit(&err);
                            }
                        }
                    }
                });
                let mut slots = self.slots.lock();
                if slots.data_epoch == epoch {
                    slots.cancel = Some(token);
                    slots.task = Some(task);
                } else {
                    drop(slots);
                    token.cancel();
                    task.abort();
                }
            }
        }
    }

    /// Establish the unbounded count subscription (traditional mode,
    /// observable queries only). Unaffected by page changes.
    fn subscribe_count(self: &Arc<Self>) {
        if self.mode != PaginationMode::Traditional {
            return;
        }
        let (query, epoch) = {
            let slots = self.slots.lock();
            (slots.query.clone(), slots.count_epoch)
        };
        let Some(DocQuery::Observable { collection, spec }) = query else {
            return;
        };

        let mut unbounded = self.apply_sort(spec);
        unbounded.skip = None;
        unbounded.limit = None;

        let page_size = self.page_size;
        let weak = Arc::downgrade(self);
        let unsub = collection.observe(
            unbounded,
            Arc::new(move |emission| {
                if let Some(engine) = weak.upgrade() {
                    let pages = emission.count().div_ceil(page_size);
                    engine.dispatch(Action::CountPages(pages));
                }
            }),
        );
        let mut slots = self.slots.lock();
        if slots.count_epoch == epoch {
            slots.count = Some(unsub);
        } else {
            drop(slots);
            unsub();
        }
    }

    /// Deliver a normalized result window to the reducer.
    fn apply_docs(&self, docs: Vec<Document>) {
        let result = if self.json {
            ResultDocs::Snapshots(docs.iter().map(Document::to_json).collect())
        } else {
            ResultDocs::Documents(docs)
        };
        self.dispatch(Action::FetchSuccess {
            docs: result,
            mode: self.mode,
            page_size: self.page_size,
        });
    }

    /// Apply the mode's pagination bounds (and the sort override) to the
    /// attached query's spec.
    ///
    /// Infinite mode re-requests the whole accumulated range on every page —
    /// limit without skip — so concurrent writes cannot duplicate or drop
    /// rows across page boundaries.
    fn bounded_spec(&self, spec: QuerySpec) -> QuerySpec {
        let mut spec = self.apply_sort(spec);
        let page = self.state.lock().page.unwrap_or(1);
        match self.mode {
            PaginationMode::None => {}
            PaginationMode::Infinite => {
                spec.skip = None;
                spec.limit = Some(page * self.page_size);
            }
            PaginationMode::Traditional => {
                spec.skip = Some((page - 1) * self.page_size);
                spec.limit = Some(self.page_size);
            }
        }
        spec
    }

    fn apply_sort(&self, mut spec: QuerySpec) -> QuerySpec {
        if let Some(sort) = &self.sort {
            spec.sort = vec![sort.clone()];
        }
        spec
    }
}
