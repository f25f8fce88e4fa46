//! Query type definitions: spec (filter, sort, pagination bounds), the two
//! query forms, and emission/normalization helpers.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Document, ReactiveCollection};
use crate::error::LiveQueryError;

// ============================================================================
// Sort Types
// ============================================================================

/// Sort direction for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A sort specification for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub field: String,
    pub direction: SortDirection,
}

impl SortEntry {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

// ============================================================================
// QuerySpec
// ============================================================================

/// Complete query specification: filter, sort, and pagination bounds.
///
/// Filters are flat equality objects (`{ "field": value, ... }`); the
/// executing collection rejects `$`-prefixed operators it does not support.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub filter: Option<Value>,
    pub sort: Vec<SortEntry>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the filter object.
    pub fn filter(mut self, filter: Value) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Append a sort entry.
    pub fn sort(mut self, entry: SortEntry) -> Self {
        self.sort.push(entry);
        self
    }

    /// Skip the first `n` matches.
    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    /// Cap the result window at `n` documents.
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

// ============================================================================
// Emissions and lookup outcomes
// ============================================================================

/// One emission from an observable query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEmission {
    /// Multi-result query: the full current matching window.
    Many(Vec<Document>),
    /// Single-result query: the current match, if any.
    One(Option<Document>),
}

impl QueryEmission {
    /// Normalize to a document list (a single match becomes a one-element
    /// list, no match becomes an empty one).
    pub fn to_docs(&self) -> Vec<Document> {
        match self {
            Self::Many(docs) => docs.clone(),
            Self::One(Some(doc)) => vec![doc.clone()],
            Self::One(None) => Vec::new(),
        }
    }

    /// Number of documents in this emission.
    pub fn count(&self) -> usize {
        match self {
            Self::Many(docs) => docs.len(),
            Self::One(doc) => usize::from(doc.is_some()),
        }
    }
}

/// Outcome of a promise-form lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseDocs {
    /// Plain ordered list.
    List(Vec<Document>),
    /// Keyed map (id → document), as id-batch lookups return it.
    Keyed(BTreeMap<String, Document>),
}

impl PromiseDocs {
    /// Normalize to a document list. Keyed results come out in key order.
    pub fn into_docs(self) -> Vec<Document> {
        match self {
            Self::List(docs) => docs,
            Self::Keyed(map) => map.into_values().collect(),
        }
    }
}

/// Shared future resolving once with a lookup outcome.
///
/// Shared so the same lookup can be re-observed across resubscriptions
/// without re-running it.
pub type LookupFuture = Shared<BoxFuture<'static, Result<PromiseDocs, LiveQueryError>>>;

// ============================================================================
// DocQuery
// ============================================================================

/// A query in one of its two forms.
#[derive(Clone)]
pub enum DocQuery {
    /// Live stream of matching documents, replayed on every change.
    /// Skip/limit/sort are composed into the spec before subscribing.
    Observable {
        collection: Arc<dyn ReactiveCollection>,
        spec: QuerySpec,
    },
    /// One-shot lookup with no live form (e.g. an id-batch fetch).
    Promise(LookupFuture),
}

impl DocQuery {
    /// Build the observable form.
    pub fn observable(collection: Arc<dyn ReactiveCollection>, spec: QuerySpec) -> Self {
        Self::Observable { collection, spec }
    }

    /// Build the promise form from a boxed future.
    pub fn promise(fut: BoxFuture<'static, Result<PromiseDocs, LiveQueryError>>) -> Self {
        Self::Promise(fut.shared())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
