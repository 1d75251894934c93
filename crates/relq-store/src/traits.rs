//! List store abstraction trait
//!
//! This module defines the ListStore trait that all store backends must implement.

use crate::StoreBackend;
use async_trait::async_trait;
use thiserror::Error;

/// Store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Store command {command} failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },

    /// The operation was abandoned because the store (or its connection) went away.
    #[error("Store operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub fn command(command: &'static str, message: impl Into<String>) -> Self {
        StoreError::Command {
            command,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, StoreError::Cancelled)
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// List store abstraction trait
///
/// Lists are addressed by a database index and a name. The head of a list is where
/// producers push; the tail is where consumers pop, so a list read tail-first is FIFO
/// with respect to `push_head` calls.
///
/// Blocking operations take a timeout in whole seconds and return `Ok(None)` when it
/// elapses with nothing to pop. A timeout of 0 blocks without limit.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Insert a value at the head of a list, creating the list if needed.
    async fn push_head(&self, db: i64, list: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Remove and return the value at the tail of a list.
    async fn pop_tail(&self, db: i64, list: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Wait up to `timeout_secs` for a value and remove it from the tail of a list.
    async fn blocking_pop_tail(
        &self,
        db: i64,
        list: &str,
        timeout_secs: u64,
    ) -> StoreResult<Option<Vec<u8>>>;

    /// Wait up to `timeout_secs` for a value at the tail of `source` and atomically
    /// move it to the head of `destination`.
    ///
    /// When a value is returned it is already at the head of `destination`.
    async fn blocking_move_tail_to_head(
        &self,
        db: i64,
        source: &str,
        destination: &str,
        timeout_secs: u64,
    ) -> StoreResult<Option<Vec<u8>>>;

    /// Read the values between `start` and `stop` (both inclusive, head first).
    ///
    /// Negative indices count from the tail: -1 is the last element.
    async fn range(&self, db: i64, list: &str, start: i64, stop: i64)
        -> StoreResult<Vec<Vec<u8>>>;

    /// Get the store backend type
    fn backend_type(&self) -> StoreBackend;
}

/// Resolve an inclusive `[start, stop]` range with negative indices against a list of
/// `len` elements. Returns `None` when the range selects nothing.
pub fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}
