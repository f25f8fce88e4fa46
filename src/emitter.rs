//! Broadcast<T> — a typed synchronous pub/sub primitive.
//!
//! Listeners are stored as `Arc<dyn Fn(&T)>` so snapshots are cheap.
//! Snapshot-on-emit semantics mean:
//!   - A listener removed *during* emission is still called in that round.
//!   - A listener added *during* emission is NOT called until the next emit.
//!
//! All methods take `&self` (interior mutability via `parking_lot::Mutex`),
//! and the lock is never held while a callback runs, so listeners can freely
//! subscribe/unsubscribe from inside a callback without deadlocking.
//!
//! `on()` returns an [`Unsubscribe`] closure rather than a listener id; the
//! closure owns everything it needs to remove the listener, so subscription
//! lifetimes can be tied to the consumer that created them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// An owned one-shot closure that removes a subscription when called.
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

/// Closure type for broadcast listeners.
pub type ListenerFn<T> = dyn Fn(&T) + Send + Sync;

/// Typed synchronous broadcast channel.
pub struct Broadcast<T> {
    listeners: Arc<Mutex<Vec<(u64, Arc<ListenerFn<T>>)>>>,
    next_id: AtomicU64,
}

impl<T: 'static> Broadcast<T> {
    /// Create a new, empty broadcast.
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `callback` and return the closure that removes it.
    ///
    /// Safe to call the returned [`Unsubscribe`] at most once; dropping it
    /// without calling leaves the listener registered for the broadcast's
    /// lifetime.
    pub fn on(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(callback)));

        let listeners = Arc::clone(&self.listeners);
        Box::new(move || {
            listeners.lock().retain(|(lid, _)| *lid != id);
        })
    }

    /// Emit `event` to all currently registered listeners.
    ///
    /// A snapshot of the listener list is taken before iteration so that
    /// additions or removals during a callback do not affect the current
    /// emission round.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Arc<ListenerFn<T>>> = {
            let guard = self.listeners.lock();
            guard.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        // Lock released — callbacks may re-enter on().
        for cb in snapshot {
            cb(event);
        }
    }

    /// Number of currently registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// `true` if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

impl<T: 'static> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
