//! LiveQuery — resolver + query constructor + engine, wired together.
//!
//! The consumer names a collection and supplies a constructor that turns the
//! resolved collection into a [`DocQuery`]. Whenever the resolved collection's
//! identity changes (lazy creation, recreation, handle swap) or the
//! constructor is replaced, the engine is re-pointed at the freshly built
//! query; while no collection or no query is available the engine waits in
//! its loading state.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::collection::CollectionResolver;
use super::results::{QueryOptions, QueryResults};
use super::state::{FetchState, ResultDocs};
use crate::context::DatabaseContext;
use crate::db::ReactiveCollection;
use crate::db::query::DocQuery;
use crate::emitter::Unsubscribe;
use crate::error::LiveQueryError;

/// Builds a query from a resolved collection. Returning `None` leaves the
/// engine waiting.
pub type QueryConstructor =
    Arc<dyn Fn(&Arc<dyn ReactiveCollection>) -> Option<DocQuery> + Send + Sync>;

/// Live results for a named collection and a caller-supplied query.
pub struct LiveQuery {
    resolver: CollectionResolver,
    results: Arc<QueryResults>,
    constructor: Arc<Mutex<QueryConstructor>>,
    resolve_sub: Option<Unsubscribe>,
}

impl LiveQuery {
    pub fn new(
        context: &DatabaseContext,
        collection: impl Into<String>,
        constructor: QueryConstructor,
        options: QueryOptions,
    ) -> Self {
        let resolver = CollectionResolver::new(context, collection);
        let results = Arc::new(QueryResults::new(options));
        let constructor = Arc::new(Mutex::new(constructor));

        let resolve_sub = {
            let results: Weak<QueryResults> = Arc::downgrade(&results);
            let constructor = Arc::clone(&constructor);
            resolver.on_resolve(move |collection| {
                if let Some(results) = results.upgrade() {
                    let build = Arc::clone(&*constructor.lock());
                    results.set_query(collection.as_ref().and_then(|c| build(c)));
                }
            })
        };

        let live = Self {
            resolver,
            results,
            constructor,
            resolve_sub: Some(resolve_sub),
        };
        live.rewire();
        live
    }

    /// Replace the query constructor and rebuild the query — the
    /// query-identity-change path for callers whose query inputs (filters,
    /// sort) change over time.
    pub fn set_constructor(&self, constructor: QueryConstructor) {
        *self.constructor.lock() = constructor;
        self.rewire();
    }

    /// The underlying engine, for pagination controls not re-exported here.
    pub fn results(&self) -> &QueryResults {
        &self.results
    }

    /// Snapshot of the current render state.
    pub fn state(&self) -> FetchState {
        self.results.state()
    }

    /// Snapshot of the current result window.
    pub fn result(&self) -> ResultDocs {
        self.results.result()
    }

    pub fn fetch_more(&self) {
        self.results.fetch_more();
    }

    pub fn fetch_page(&self, page: usize) {
        self.results.fetch_page(page);
    }

    pub fn reset(&self) {
        self.results.reset();
    }

    pub fn on_change(&self, callback: impl Fn(&FetchState) + Send + Sync + 'static) -> Unsubscribe {
        self.results.on_change(callback)
    }

    pub fn on_error(
        &self,
        callback: impl Fn(&LiveQueryError) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.results.on_error(callback)
    }

    fn rewire(&self) {
        let build = Arc::clone(&*self.constructor.lock());
        let query = self.resolver.current().as_ref().and_then(|c| build(c));
        self.results.set_query(query);
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        if let Some(unsub) = self.resolve_sub.take() {
            unsub();
        }
    }
}
