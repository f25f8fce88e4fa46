use thiserror::Error;

// ---------------------------------------------------------------------------
// LiveQueryError
// ---------------------------------------------------------------------------

/// Errors surfaced by the live-query layer.
///
/// All variants are `Clone` so errors can travel through shared futures and
/// broadcast channels. The engine never returns these from its control
/// functions — invalid requests degrade to no-ops — so the only delivery
/// paths are the promise-form lookup future and the `on_error` channel.
#[derive(Debug, Clone, Error)]
pub enum LiveQueryError {
    /// A filter used an operator the executing collection does not support.
    #[error("Unsupported filter operator: {0}")]
    UnsupportedFilter(String),

    /// A promise-form id lookup failed (source dropped, backend error).
    #[error("Lookup failed: {0}")]
    Lookup(String),
}

/// Convenience alias — the default error type is `LiveQueryError`.
pub type Result<T, E = LiveQueryError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
