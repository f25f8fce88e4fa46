//! Scoped distribution of the active database handle.
//!
//! A [`DatabaseContext`] is a chain of scopes: each scope may carry its own
//! handle and/or id-attribute override, and resolution walks from the
//! innermost scope outward (innermost wins). The handle may be supplied
//! after construction via [`set_db`](DatabaseContext::set_db) — consumers
//! subscribed through [`on_change`](DatabaseContext::on_change) re-resolve
//! once it appears, and nothing panics while it is absent.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::db::DatabaseHandle;
use crate::emitter::{Broadcast, Unsubscribe};

/// Id attribute used when no scope overrides it.
pub const DEFAULT_ID_ATTRIBUTE: &str = "id";

struct Scope {
    parent: Option<Arc<Scope>>,
    db: Mutex<Option<DatabaseHandle>>,
    id_attribute: Option<String>,
    changes: Broadcast<()>,
}

/// One scope in the context chain. Cloning shares the scope.
#[derive(Clone)]
pub struct DatabaseContext {
    inner: Arc<Scope>,
}

impl DatabaseContext {
    /// Root scope with no handle yet (lazy instantiation).
    pub fn new() -> Self {
        Self::build(None, None, None)
    }

    /// Root scope carrying a handle from the start.
    pub fn with_db(db: DatabaseHandle) -> Self {
        Self::build(None, Some(db), None)
    }

    /// Nested scope inheriting everything from `self`.
    pub fn child(&self) -> Self {
        Self::build(Some(Arc::clone(&self.inner)), None, None)
    }

    /// Nested scope overriding the handle for its own subtree.
    pub fn child_with_db(&self, db: DatabaseHandle) -> Self {
        Self::build(Some(Arc::clone(&self.inner)), Some(db), None)
    }

    /// Nested scope overriding the id attribute for its own subtree.
    pub fn child_with_id_attribute(&self, id_attribute: impl Into<String>) -> Self {
        Self::build(
            Some(Arc::clone(&self.inner)),
            None,
            Some(id_attribute.into()),
        )
    }

    fn build(
        parent: Option<Arc<Scope>>,
        db: Option<DatabaseHandle>,
        id_attribute: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Scope {
                parent,
                db: Mutex::new(db),
                id_attribute,
                changes: Broadcast::new(),
            }),
        }
    }

    /// The effective handle: this scope's own if set, else the nearest
    /// ancestor's.
    pub fn db(&self) -> Option<DatabaseHandle> {
        let mut scope = Some(&self.inner);
        while let Some(s) = scope {
            if let Some(db) = s.db.lock().clone() {
                return Some(db);
            }
            scope = s.parent.as_ref();
        }
        None
    }

    /// The effective id attribute: nearest override, else
    /// [`DEFAULT_ID_ATTRIBUTE`].
    pub fn id_attribute(&self) -> String {
        let mut scope = Some(&self.inner);
        while let Some(s) = scope {
            if let Some(attr) = &s.id_attribute {
                return attr.clone();
            }
            scope = s.parent.as_ref();
        }
        DEFAULT_ID_ATTRIBUTE.to_string()
    }

    /// Supply (or replace) this scope's own handle and wake subscribers.
    pub fn set_db(&self, db: DatabaseHandle) {
        *self.inner.db.lock() = Some(db);
        self.inner.changes.emit(&());
    }

    /// Subscribe to handle changes anywhere in this scope's chain.
    ///
    /// A `set_db` on any ancestor can change what [`db`](Self::db) resolves
    /// to here, so the subscription spans the whole chain.
    pub fn on_change(&self, callback: impl Fn() + Send + Sync + 'static) -> Unsubscribe {
        let callback = Arc::new(callback);
        let mut unsubs = Vec::new();
        let mut scope = Some(&self.inner);
        while let Some(s) = scope {
            let cb = Arc::clone(&callback);
            unsubs.push(s.changes.on(move |_| cb()));
            scope = s.parent.as_ref();
        }
        Box::new(move || {
            for unsub in unsubs {
                unsub();
            }
        })
    }
}

impl Default for DatabaseContext {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
