//! Fetch state machine: state shape, action union, and the pure reducer.
//!
//! The reducer applies transitions only; validity guards (mode checks, page
//! bounds, fetching/exhausted checks) live in the engine's control functions,
//! which refuse to dispatch invalid actions.

use serde_json::Value;

use crate::db::Document;

// ============================================================================
// Pagination modes
// ============================================================================

/// Pagination strategy requested by the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pagination {
    /// Cumulative paging: each page request grows the window from the start.
    #[default]
    Infinite,
    /// Fixed-window paging with a known total page count.
    Traditional,
}

/// Effective mode once the page size is taken into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationMode {
    /// No page size: the whole matching dataset in one fetch.
    None,
    Infinite,
    Traditional,
}

impl PaginationMode {
    /// Derive the effective mode from the configured strategy and page size.
    pub fn derive(pagination: Pagination, page_size: Option<usize>) -> Self {
        match page_size {
            None | Some(0) => Self::None,
            Some(_) => match pagination {
                Pagination::Infinite => Self::Infinite,
                Pagination::Traditional => Self::Traditional,
            },
        }
    }
}

// ============================================================================
// Result shapes
// ============================================================================

/// A single result entry in either representation.
#[derive(Debug, Clone, PartialEq)]
pub enum DocItem {
    Document(Document),
    Snapshot(Value),
}

/// The engine's result window: live handles, or plain snapshots when the
/// json option is set.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultDocs {
    Documents(Vec<Document>),
    Snapshots(Vec<Value>),
}

impl ResultDocs {
    /// An empty window in the given representation.
    pub fn empty(json: bool) -> Self {
        if json {
            Self::Snapshots(Vec::new())
        } else {
            Self::Documents(Vec::new())
        }
    }

    /// An empty window in the same representation as `self`.
    pub fn empty_like(&self) -> Self {
        match self {
            Self::Documents(_) => Self::Documents(Vec::new()),
            Self::Snapshots(_) => Self::Snapshots(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Documents(docs) => docs.len(),
            Self::Snapshots(snaps) => snaps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The entry at `index`, if present.
    pub fn get(&self, index: usize) -> Option<DocItem> {
        match self {
            Self::Documents(docs) => docs.get(index).cloned().map(DocItem::Document),
            Self::Snapshots(snaps) => snaps.get(index).cloned().map(DocItem::Snapshot),
        }
    }

    /// The first entry, if present.
    pub fn first(&self) -> Option<DocItem> {
        self.get(0)
    }
}

// ============================================================================
// FetchState
// ============================================================================

/// Render state exposed to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchState {
    /// Current result window.
    pub result: ResultDocs,
    /// True from the moment a query is (re)issued until its first result.
    pub is_fetching: bool,
    /// Infinite mode: the last fetch came back short. Unpaginated: true
    /// after the first fetch. Traditional mode: always false (use
    /// `page_count`).
    pub is_exhausted: bool,
    /// Current 1-based page. `None` when unpaginated.
    pub page: Option<usize>,
    /// Total page count (traditional mode only; 0 until counted).
    pub page_count: usize,
}

impl FetchState {
    /// The state before any query has been attached.
    pub fn initial(mode: PaginationMode, starting_page: usize, json: bool) -> Self {
        Self {
            result: ResultDocs::empty(json),
            is_fetching: true,
            is_exhausted: false,
            page: match mode {
                PaginationMode::None => None,
                PaginationMode::Infinite => Some(1),
                PaginationMode::Traditional => Some(starting_page),
            },
            page_count: 0,
        }
    }
}

// ============================================================================
// Actions and reducer
// ============================================================================

/// State transitions. Guards are the caller's responsibility.
#[derive(Debug, Clone)]
pub enum Action {
    /// Back to page 1 with an empty window (infinite mode).
    Reset,
    /// Grow the window by one page (infinite mode).
    FetchMore,
    /// Jump to a specific page (traditional mode).
    FetchPage(usize),
    /// A new total page count from the count subscription.
    CountPages(usize),
    /// A result window arrived from the active query.
    FetchSuccess {
        docs: ResultDocs,
        mode: PaginationMode,
        page_size: usize,
    },
    /// The effective query identity changed; result is kept until new data
    /// arrives so consumers do not flash an empty window.
    QueryChanged,
}

/// Apply `action` to `state`, producing the next state.
pub fn reduce(state: &FetchState, action: Action) -> FetchState {
    match action {
        Action::Reset => FetchState {
            result: state.result.empty_like(),
            is_fetching: true,
            page: Some(1),
            ..state.clone()
        },
        Action::FetchMore => FetchState {
            is_fetching: true,
            page: Some(state.page.unwrap_or(1) + 1),
            ..state.clone()
        },
        Action::FetchPage(page) => FetchState {
            is_fetching: true,
            page: Some(page),
            ..state.clone()
        },
        Action::CountPages(page_count) => FetchState {
            page_count,
            ..state.clone()
        },
        Action::FetchSuccess {
            docs,
            mode,
            page_size,
        } => {
            let is_exhausted = match mode {
                // A single unpaginated fetch is definitionally complete.
                PaginationMode::None => true,
                PaginationMode::Infinite => {
                    docs.len() < state.page.unwrap_or(1) * page_size
                }
                // Exhaustion is not a concept in fixed-page mode.
                PaginationMode::Traditional => false,
            };
            FetchState {
                result: docs,
                is_fetching: false,
                is_exhausted,
                ..state.clone()
            }
        }
        Action::QueryChanged => FetchState {
            is_fetching: true,
            ..state.clone()
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
