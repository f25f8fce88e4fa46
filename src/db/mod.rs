//! Collaborator interface — the capabilities the live layer requires from an
//! external reactive document database.
//!
//! # Modules
//!
//! - [`query`] — [`QuerySpec`], [`DocQuery`], emission/normalization types.
//! - [`document`] — [`Document`] revision handle and snapshot conversion.
//! - [`memory`] — in-memory reference implementation for tests and examples.
//!
//! The live layer never mutates a database through these traits; it only
//! reads and subscribes. Unsubscribe closures must take effect immediately —
//! the engine relies on unsubscribe-before-replace to keep stale emissions
//! out, not on sequence numbers.

pub mod document;
pub mod memory;
pub mod query;

pub use document::Document;
pub use memory::{MemoryCollection, MemoryDatabase};
pub use query::{
    DocQuery, LookupFuture, PromiseDocs, QueryEmission, QuerySpec, SortDirection, SortEntry,
};

use std::sync::Arc;

use crate::emitter::Unsubscribe;

/// Shared handle to an external reactive database.
pub type DatabaseHandle = Arc<dyn ReactiveDatabase>;

/// Record describing a collection newly registered on a database handle.
#[derive(Clone)]
pub struct CollectionAdded {
    pub name: String,
    pub collection: Arc<dyn ReactiveCollection>,
}

/// A database handle: named collections plus a broadcast of registrations.
///
/// Collections are lazily created; a lookup may return `None` for a name
/// that appears later, and a name may be re-registered with a fresh
/// collection object after removal. Pointer identity of the returned `Arc`
/// is the collection's identity.
pub trait ReactiveDatabase: Send + Sync {
    /// Look up the current collection for `name`, if registered.
    fn collection(&self, name: &str) -> Option<Arc<dyn ReactiveCollection>>;

    /// Subscribe to collection registrations.
    ///
    /// Fired once per newly registered collection, including re-creations
    /// under a previously used name.
    fn on_collection_added(
        &self,
        callback: Arc<dyn Fn(&CollectionAdded) + Send + Sync>,
    ) -> Unsubscribe;
}

/// A named, reactive container of documents.
pub trait ReactiveCollection: Send + Sync {
    /// The collection's registered name.
    fn name(&self) -> &str;

    /// Subscribe to live results of `spec`.
    ///
    /// The callback receives the current matching window on registration and
    /// again after every underlying change. Implementations must stop
    /// delivering synchronously once the returned [`Unsubscribe`] runs.
    fn observe(
        &self,
        spec: QuerySpec,
        callback: Arc<dyn Fn(&QueryEmission) + Send + Sync>,
    ) -> Unsubscribe;
}
