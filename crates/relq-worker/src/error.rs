//! Error types module
//!
//! [`QueueError`] is returned synchronously by queue operations. [`ConsumerError`] is
//! only ever delivered through a consumer's completion, once the drain loop has
//! terminated.

use relq_store::StoreError;
use std::string::FromUtf8Error;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("There is already a consumer on the requested queue (db={db} queueName={queue}).")]
    DuplicateConsumer { db: i64, queue: String },

    #[error("There isn't a consumer on the requested queue (db={db} queueName={queue}).")]
    NoActiveConsumer { db: i64, queue: String },

    #[error("The consumer on the requested queue is still running (db={db} queueName={queue}).")]
    ConsumerStillRunning { db: i64, queue: String },

    #[error("Consumers must be started from within a tokio runtime")]
    NoRuntime,

    #[error("Stored value is not valid UTF-8: {0}")]
    Decode(#[from] FromUtf8Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a consumer's drain loop faulted.
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// The callback returned an error. The original error is kept as the source and can
    /// be recovered with [`ConsumerError::callback_error`] and `downcast_ref`.
    #[error("Callback failed on queue (db={db} queueName={queue}): {source}")]
    Callback {
        db: i64,
        queue: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Callback panicked on queue (db={db} queueName={queue}): {message}")]
    CallbackPanicked {
        db: i64,
        queue: String,
        message: String,
    },

    #[error("Item on queue (db={db} queueName={queue}) is not valid UTF-8: {source}")]
    Decode {
        db: i64,
        queue: String,
        #[source]
        source: FromUtf8Error,
    },

    #[error("Store operation {operation} failed on queue (db={db} queueName={queue}): {source}")]
    Store {
        db: i64,
        queue: String,
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ConsumerError {
    /// The error returned by the user callback, if that is what stopped the loop.
    pub fn callback_error(&self) -> Option<&anyhow::Error> {
        match self {
            ConsumerError::Callback { source, .. } => Some(source),
            _ => None,
        }
    }
}
