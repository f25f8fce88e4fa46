//! CollectionResolver — reactive lookup of a named collection.
//!
//! Collections are created lazily and may be removed and re-registered under
//! the same name, so the resolver never stops tracking the handle's
//! collection-added stream: every event triggers a fresh lookup by name, and
//! a pointer-identity change (including adoption of a recreated collection)
//! is pushed to subscribers.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::DatabaseContext;
use crate::db::{DatabaseHandle, ReactiveCollection};
use crate::emitter::{Broadcast, Unsubscribe};

/// Reactive resolver for one (context, collection name) pair.
pub struct CollectionResolver {
    inner: Arc<ResolverInner>,
    ctx_sub: Option<Unsubscribe>,
}

struct ResolverInner {
    name: String,
    context: DatabaseContext,
    current: Mutex<Option<Arc<dyn ReactiveCollection>>>,
    /// The handle whose collection-added stream we are subscribed to, with
    /// its unsubscribe. Replaced when the effective handle changes.
    db_sub: Mutex<Option<(DatabaseHandle, Unsubscribe)>>,
    changes: Broadcast<Option<Arc<dyn ReactiveCollection>>>,
}

impl CollectionResolver {
    pub fn new(context: &DatabaseContext, name: impl Into<String>) -> Self {
        let inner = Arc::new(ResolverInner {
            name: name.into(),
            context: context.clone(),
            current: Mutex::new(None),
            db_sub: Mutex::new(None),
            changes: Broadcast::new(),
        });

        let weak = Arc::downgrade(&inner);
        let ctx_sub = context.on_change(move || {
            if let Some(inner) = weak.upgrade() {
                inner.refresh();
            }
        });
        inner.refresh();

        Self {
            inner,
            ctx_sub: Some(ctx_sub),
        }
    }

    /// The collection currently resolved for the name, if any.
    pub fn current(&self) -> Option<Arc<dyn ReactiveCollection>> {
        self.inner.current.lock().clone()
    }

    /// Subscribe to identity changes of the resolved collection.
    pub fn on_resolve(
        &self,
        callback: impl Fn(&Option<Arc<dyn ReactiveCollection>>) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.inner.changes.on(callback)
    }
}

impl Drop for CollectionResolver {
    fn drop(&mut self) {
        if let Some(unsub) = self.ctx_sub.take() {
            unsub();
        }
        let db_sub = self.inner.db_sub.lock().take();
        if let Some((_, unsub)) = db_sub {
            unsub();
        }
    }
}

impl ResolverInner {
    /// Re-evaluate the effective handle, retracking its creation stream if
    /// the handle itself changed, then re-run the lookup.
    fn refresh(self: &Arc<Self>) {
        let db = self.context.db();

        let tracked_changed = {
            let guard = self.db_sub.lock();
            match (&*guard, &db) {
                (Some((tracked, _)), Some(current)) => !Arc::ptr_eq(tracked, current),
                (None, None) => false,
                _ => true,
            }
        };

        if tracked_changed {
            let previous = self.db_sub.lock().take();
            if let Some((_, unsub)) = previous {
                unsub();
            }
            if let Some(db) = &db {
                let weak = Arc::downgrade(self);
                let unsub = db.on_collection_added(Arc::new(move |_record| {
                    // Re-match by name on every event — a recreated
                    // collection under the same name must be re-adopted.
                    if let Some(inner) = weak.upgrade() {
                        inner.relookup();
                    }
                }));
                *self.db_sub.lock() = Some((Arc::clone(db), unsub));
            }
        }

        self.relookup();
    }

    /// Look the name up on the effective handle; push on identity change.
    fn relookup(&self) {
        let found = self
            .context
            .db()
            .and_then(|db| db.collection(&self.name));

        let changed = {
            let mut current = self.current.lock();
            let same = match (&*current, &found) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if same {
                false
            } else {
                *current = found.clone();
                true
            }
        };

        if changed {
            tracing::debug!(
                collection = %self.name,
                resolved = found.is_some(),
                "collection identity changed"
            );
            self.changes.emit(&found);
        }
    }
}
