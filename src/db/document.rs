//! Document — a shared revision handle over one record.
//!
//! A `Document` is cheap to clone (it shares the underlying revision) and
//! converts on demand to an immutable plain-JSON snapshot. The conversion is
//! one-directional: a snapshot keeps no link back to the handle.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

struct DocumentInner {
    id: String,
    data: Value,
}

/// Handle to a single document revision.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

impl Document {
    /// Build a handle from an id and its record payload.
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                id: id.into(),
                data,
            }),
        }
    }

    /// The document's id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Borrow the record payload.
    pub fn data(&self) -> &Value {
        &self.inner.data
    }

    /// Read a single top-level field of the payload.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.inner.data.get(field)
    }

    /// Detach an immutable plain-JSON snapshot of this revision.
    pub fn to_json(&self) -> Value {
        self.inner.data.clone()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.id == other.inner.id && self.inner.data == other.inner.data)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.inner.id)
            .field("data", &self.inner.data)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
