//! Live layer — reactive query results for consumers.
//!
//! # Overview
//!
//! [`QueryResults`] is the pagination/fetch engine: an explicit reducer
//! ([`state`]) driven by a subscription-management layer ([`results`]).
//! [`LiveQuery`] composes it with the [`CollectionResolver`] and a
//! caller-supplied query constructor; [`LiveDocument`] specializes the whole
//! stack to a single-document lookup by id.
//!
//! # Modules
//!
//! - [`state`] — [`FetchState`], [`Action`], the pure [`reduce`] function.
//! - [`results`] — [`QueryResults`] and [`QueryOptions`].
//! - [`collection`] — [`CollectionResolver`].
//! - [`query`] — [`LiveQuery`] and [`QueryConstructor`].
//! - [`document`] — [`LiveDocument`] and its option/state types.

pub mod collection;
pub mod document;
pub mod query;
pub mod results;
pub mod state;

pub use collection::CollectionResolver;
pub use document::{DocumentOptions, DocumentState, LiveDocument};
pub use query::{LiveQuery, QueryConstructor};
pub use results::{QueryOptions, QueryResults};
pub use state::{Action, DocItem, FetchState, Pagination, PaginationMode, ResultDocs, reduce};
