//! LiveDocument — single-document lookup by id attribute.
//!
//! A thin specialization of [`LiveQuery`]: builds an equality query on the
//! effective id attribute (call override, else the context's ambient
//! default), runs it unpaginated, and unwraps the window to its first
//! element. With no id there is no query, so the state stays loading — a
//! full-collection fetch for a missing id would be meaningless.

use std::sync::Arc;

use serde_json::Value;

use super::query::{LiveQuery, QueryConstructor};
use super::results::QueryOptions;
use super::state::DocItem;
use crate::context::DatabaseContext;
use crate::db::query::{DocQuery, QuerySpec};
use crate::emitter::Unsubscribe;

/// Options for a by-id lookup.
#[derive(Debug, Clone, Default)]
pub struct DocumentOptions {
    /// Override the context's id attribute for this lookup only.
    pub id_attribute: Option<String>,
    /// Return a plain snapshot instead of a document handle.
    pub json: bool,
}

/// Render state of a by-id lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentState {
    /// The matched document, once settled. `None` after settling means no
    /// record carries the id.
    pub result: Option<DocItem>,
    pub is_fetching: bool,
}

/// Live lookup of one document by id.
pub struct LiveDocument {
    query: LiveQuery,
}

impl LiveDocument {
    pub fn new(
        context: &DatabaseContext,
        collection: impl Into<String>,
        id: Option<String>,
        options: DocumentOptions,
    ) -> Self {
        let id_attribute = options
            .id_attribute
            .unwrap_or_else(|| context.id_attribute());

        let constructor: QueryConstructor = match id {
            None => Arc::new(|_| None),
            Some(id) => Arc::new(move |collection| {
                let mut filter = serde_json::Map::new();
                filter.insert(id_attribute.clone(), Value::String(id.clone()));
                Some(DocQuery::observable(
                    Arc::clone(collection),
                    QuerySpec::new().filter(Value::Object(filter)),
                ))
            }),
        };

        let query = LiveQuery::new(
            context,
            collection,
            constructor,
            QueryOptions {
                json: options.json,
                ..Default::default()
            },
        );
        Self { query }
    }

    /// Snapshot of the current lookup state.
    pub fn state(&self) -> DocumentState {
        let state = self.query.state();
        DocumentState {
            result: state.result.first(),
            is_fetching: state.is_fetching,
        }
    }

    /// The matched document, if settled with a match.
    pub fn result(&self) -> Option<DocItem> {
        self.query.result().first()
    }

    /// Subscribe to lookup state changes.
    pub fn on_change(
        &self,
        callback: impl Fn(&DocumentState) + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.query.on_change(move |state| {
            callback(&DocumentState {
                result: state.result.first(),
                is_fetching: state.is_fetching,
            })
        })
    }
}
