//! Error taxonomy for the order processing core.
//!
//! Mirrors the teacher's split between a typed `thiserror` enum for
//! data-plane failures and `anyhow` for startup/composition-root failures
//! in `main`.

use thiserror::Error;

/// Failures surfaced by the key-value adapter and the order store built on
/// top of it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key-value store operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to (de)serialize stored payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("the per-order lease for {0} is held by another matcher")]
    Locked(String),

    #[error("stock book for {pair}:{direction} is empty")]
    StockBookEmpty { pair: String, direction: String },
}

impl StoreError {
    pub fn is_locked(&self) -> bool {
        matches!(self, StoreError::Locked(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_stock_book_empty(&self) -> bool {
        matches!(self, StoreError::StockBookEmpty { .. })
    }
}

/// Observed while matching: the counterparty (or the incoming order itself)
/// has passed its `expiration_date`.
#[derive(Debug, Error)]
#[error("order {0} has expired")]
pub struct OrderExpired(pub String);

/// An inbound bus payload could not be decoded.
#[derive(Debug, Error)]
#[error("failed to parse inbound message: {0}")]
pub struct ParseError(pub String);

/// The bus connection could not be established inside the startup retry
/// window. Fatal — the process should not continue without a bus.
#[derive(Debug, Error)]
#[error("message bus unavailable after retrying for {elapsed_ms}ms: {source}")]
pub struct BusUnavailable {
    pub elapsed_ms: u64,
    #[source]
    pub source: lapin::Error,
}

/// Errors a service method can produce while handling one message. Kept
/// separate from `StoreError` so callers that only care about ack/nack
/// behaviour don't have to match on storage internals.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
