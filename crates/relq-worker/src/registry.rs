//! Registry of active consumers, at most one per queue.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::consumer::Consumer;
use crate::error::QueueError;

/// Database index and queue name; identifies a queue and its registry slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueueKey {
    db: i64,
    queue: String,
}

impl QueueKey {
    pub fn new(db: i64, queue: impl Into<String>) -> Self {
        Self {
            db,
            queue: queue.into(),
        }
    }

    pub fn db(&self) -> i64 {
        self.db
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "db={} queueName={}", self.db, self.queue)
    }
}

/// Registry for active consumers.
///
/// A single mutex guards the map. It is only held for the map access itself, never
/// across a store call or an await point.
///
/// Consumers stay registered after their loop terminates, so a second start on the
/// same queue keeps failing until the entry is released.
#[derive(Default)]
pub(crate) struct ConsumerRegistry {
    consumers: Mutex<HashMap<QueueKey, Arc<Consumer>>>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<QueueKey, Arc<Consumer>>> {
        self.consumers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, key: QueueKey, consumer: Arc<Consumer>) -> Result<(), QueueError> {
        let mut consumers = self.lock();
        if consumers.contains_key(&key) {
            return Err(QueueError::DuplicateConsumer {
                db: key.db,
                queue: key.queue,
            });
        }
        consumers.insert(key, consumer);
        Ok(())
    }

    pub fn get(&self, key: &QueueKey) -> Result<Arc<Consumer>, QueueError> {
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| QueueError::NoActiveConsumer {
                db: key.db,
                queue: key.queue.clone(),
            })
    }

    /// Remove a consumer whose loop has terminated, freeing its queue for a new start.
    pub fn release(&self, key: &QueueKey) -> Result<Arc<Consumer>, QueueError> {
        match self.lock().entry(key.clone()) {
            Entry::Vacant(_) => Err(QueueError::NoActiveConsumer {
                db: key.db,
                queue: key.queue.clone(),
            }),
            Entry::Occupied(entry) if !entry.get().is_terminated() => {
                Err(QueueError::ConsumerStillRunning {
                    db: key.db,
                    queue: key.queue.clone(),
                })
            }
            Entry::Occupied(entry) => Ok(entry.remove()),
        }
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<QueueKey> {
        let mut keys: Vec<QueueKey> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

}
