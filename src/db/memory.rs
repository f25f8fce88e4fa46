//! In-memory reference collaborator.
//!
//! `MemoryDatabase` / `MemoryCollection` implement the `db` traits for tests
//! and examples: writes synchronously re-run every observe subscription
//! (flush-on-write), collection creation is broadcast so late subscribers can
//! adopt lazily created collections, and id-batch lookups come back in
//! promise form.
//!
//! Not a storage engine: no persistence, no indexes, no conflict handling.
//! Query execution supports flat equality filters, field sorts, and
//! skip/limit, with a stable default order by document id.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use super::query::{DocQuery, PromiseDocs, QueryEmission, QuerySpec, SortDirection};
use super::{CollectionAdded, Document, ReactiveCollection, ReactiveDatabase};
use crate::emitter::{Broadcast, Unsubscribe};
use crate::error::{LiveQueryError, Result};

// ============================================================================
// MemoryDatabase
// ============================================================================

/// In-memory database handle: a name → collection map plus a creation stream.
pub struct MemoryDatabase {
    collections: Mutex<BTreeMap<String, Arc<MemoryCollection>>>,
    added: Broadcast<CollectionAdded>,
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            collections: Mutex::new(BTreeMap::new()),
            added: Broadcast::new(),
        })
    }

    /// Register a fresh collection under `name` and broadcast its creation.
    ///
    /// Re-registering a name replaces the previous collection; holders of the
    /// old `Arc` keep a valid but orphaned instance.
    pub fn create_collection(&self, name: &str) -> Arc<MemoryCollection> {
        let collection = Arc::new(MemoryCollection::new(name));
        self.collections
            .lock()
            .insert(name.to_string(), Arc::clone(&collection));
        self.added.emit(&CollectionAdded {
            name: name.to_string(),
            collection: Arc::clone(&collection) as Arc<dyn ReactiveCollection>,
        });
        collection
    }

    /// Unregister `name`. Returns `true` if a collection was removed.
    pub fn remove_collection(&self, name: &str) -> bool {
        self.collections.lock().remove(name).is_some()
    }
}

impl ReactiveDatabase for MemoryDatabase {
    fn collection(&self, name: &str) -> Option<Arc<dyn ReactiveCollection>> {
        self.collections
            .lock()
            .get(name)
            .cloned()
            .map(|c| c as Arc<dyn ReactiveCollection>)
    }

    fn on_collection_added(
        &self,
        callback: Arc<dyn Fn(&CollectionAdded) + Send + Sync>,
    ) -> Unsubscribe {
        self.added.on(move |record| callback(record))
    }
}

// ============================================================================
// MemoryCollection
// ============================================================================

struct ObserveSub {
    id: u64,
    spec: QuerySpec,
    callback: Arc<dyn Fn(&QueryEmission) + Send + Sync>,
}

/// In-memory reactive collection.
pub struct MemoryCollection {
    name: String,
    docs: Mutex<BTreeMap<String, Document>>,
    subs: Arc<Mutex<Vec<Arc<ObserveSub>>>>,
    next_sub: AtomicU64,
}

impl MemoryCollection {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            docs: Mutex::new(BTreeMap::new()),
            subs: Arc::new(Mutex::new(Vec::new())),
            next_sub: AtomicU64::new(1),
        }
    }

    /// Insert or replace the record under `id`, then flush subscriptions.
    pub fn insert(&self, id: &str, data: Value) -> Document {
        let doc = Document::new(id, data);
        self.docs.lock().insert(id.to_string(), doc.clone());
        self.flush();
        doc
    }

    /// Remove the record under `id`, then flush subscriptions.
    /// Returns `true` if a record was removed.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.docs.lock().remove(id).is_some();
        if removed {
            self.flush();
        }
        removed
    }

    /// Number of records currently stored.
    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    /// `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }

    /// Run `spec` against the current records.
    pub fn execute(&self, spec: &QuerySpec) -> Result<Vec<Document>> {
        let snapshot: Vec<Document> = self.docs.lock().values().cloned().collect();
        execute_spec(spec, snapshot)
    }

    /// Promise-form id-batch lookup, resolved with the records as of now.
    pub fn find_by_ids(&self, ids: &[&str]) -> DocQuery {
        let map = self.collect_by_ids(ids);
        DocQuery::promise(Box::pin(async move { Ok(PromiseDocs::Keyed(map)) }))
    }

    /// Promise-form id-batch lookup gated on `trigger`.
    ///
    /// Resolves with the records as of the call once the trigger fires;
    /// a dropped trigger surfaces as a lookup error.
    pub fn find_by_ids_when(&self, ids: &[&str], trigger: oneshot::Receiver<()>) -> DocQuery {
        let map = self.collect_by_ids(ids);
        DocQuery::promise(Box::pin(async move {
            trigger
                .await
                .map_err(|_| LiveQueryError::Lookup("lookup source dropped".to_string()))?;
            Ok(PromiseDocs::Keyed(map))
        }))
    }

    fn collect_by_ids(&self, ids: &[&str]) -> BTreeMap<String, Document> {
        let docs = self.docs.lock();
        ids.iter()
            .filter_map(|id| docs.get(*id).map(|d| (id.to_string(), d.clone())))
            .collect()
    }

    /// Re-run every subscription against the current records.
    ///
    /// Callbacks are invoked outside all locks so they can re-enter the
    /// collection (subscribe, unsubscribe, write).
    fn flush(&self) {
        let snapshot: Vec<Arc<ObserveSub>> = self.subs.lock().iter().map(Arc::clone).collect();
        for sub in snapshot {
            match self.execute(&sub.spec) {
                Ok(docs) => (sub.callback)(&QueryEmission::Many(docs)),
                Err(err) => {
                    tracing::warn!(collection = %self.name, error = %err, "query execution failed");
                }
            }
        }
    }
}

impl ReactiveCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn observe(
        &self,
        spec: QuerySpec,
        callback: Arc<dyn Fn(&QueryEmission) + Send + Sync>,
    ) -> Unsubscribe {
        let id = self.next_sub.fetch_add(1, AtomicOrdering::Relaxed);
        let sub = Arc::new(ObserveSub {
            id,
            spec,
            callback,
        });
        self.subs.lock().push(Arc::clone(&sub));

        // Initial delivery with the current window, outside the subs lock.
        match self.execute(&sub.spec) {
            Ok(docs) => (sub.callback)(&QueryEmission::Many(docs)),
            Err(err) => {
                tracing::warn!(collection = %self.name, error = %err, "query execution failed");
            }
        }

        let subs = Arc::clone(&self.subs);
        Box::new(move || {
            subs.lock().retain(|s| s.id != id);
        })
    }
}

// ============================================================================
// Spec execution
// ============================================================================

/// Filter → sort → skip/limit over an id-ordered snapshot.
fn execute_spec(spec: &QuerySpec, snapshot: Vec<Document>) -> Result<Vec<Document>> {
    let mut matched = Vec::with_capacity(snapshot.len());
    for doc in snapshot {
        if matches_filter(spec.filter.as_ref(), &doc)? {
            matched.push(doc);
        }
    }

    if !spec.sort.is_empty() {
        matched.sort_by(|a, b| {
            for entry in &spec.sort {
                let ord = compare_values(a.get(&entry.field), b.get(&entry.field));
                let ord = match entry.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    let skip = spec.skip.unwrap_or(0);
    let limited: Vec<Document> = match spec.limit {
        Some(limit) => matched.into_iter().skip(skip).take(limit).collect(),
        None => matched.into_iter().skip(skip).collect(),
    };
    Ok(limited)
}

/// Flat equality match. `None` matches everything.
fn matches_filter(filter: Option<&Value>, doc: &Document) -> Result<bool> {
    let Some(filter) = filter else {
        return Ok(true);
    };
    let Some(obj) = filter.as_object() else {
        return Ok(true);
    };
    for (key, expected) in obj {
        if key.starts_with('$') {
            return Err(LiveQueryError::UnsupportedFilter(key.clone()));
        }
        if expected.is_object() {
            return Err(LiveQueryError::UnsupportedFilter(format!(
                "{key}: nested operator"
            )));
        }
        if doc.get(key) != Some(expected) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Total order over optional JSON values: absent < null < bool < number <
/// string < everything else (by serialized form).
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) | Value::Object(_) => 4,
        }
    }

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            let by_rank = rank(a).cmp(&rank(b));
            if by_rank != Ordering::Equal {
                return by_rank;
            }
            match (a, b) {
                (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                (Value::Number(x), Value::Number(y)) => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(Ordering::Equal),
                (Value::String(x), Value::String(y)) => x.cmp(y),
                _ => a.to_string().cmp(&b.to_string()),
            }
        }
    }
}
