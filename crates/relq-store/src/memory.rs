use crate::traits::{resolve_range, ListStore, StoreError, StoreResult};
use crate::StoreBackend;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type Lists = HashMap<(i64, String), VecDeque<Vec<u8>>>;

/// In-process list store
///
/// Keeps every list in memory, keyed by database index and list name. Blocking
/// operations park on a [`Notify`] that is signalled by every push, so they wake as
/// soon as a value arrives. [`MemoryListStore::close`] plays the part of a torn-down
/// connection: every pending and later call fails with [`StoreError::Cancelled`].
pub struct MemoryListStore {
    lists: Mutex<Lists>,
    pushed: Notify,
    closed: CancellationToken,
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(HashMap::new()),
            pushed: Notify::new(),
            closed: CancellationToken::new(),
        }
    }

    /// Number of values currently held by a list.
    pub fn len(&self, db: i64, list: &str) -> usize {
        self.lock()
            .get(&(db, list.to_string()))
            .map_or(0, VecDeque::len)
    }

    /// Cancel all pending blocking calls and reject every later call.
    pub fn close(&self) {
        tracing::debug!("Closing memory list store");
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn lock(&self) -> MutexGuard<'_, Lists> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        Ok(())
    }

    /// Run `attempt` against the lists until it yields a value, the timeout elapses or
    /// the store is closed. The notification is armed before each attempt so a push
    /// landing between the attempt and the wait is not missed.
    async fn wait_for<F>(&self, timeout_secs: u64, mut attempt: F) -> StoreResult<Option<Vec<u8>>>
    where
        F: FnMut(&mut Lists) -> Option<Vec<u8>> + Send,
    {
        let deadline =
            (timeout_secs > 0).then(|| Instant::now() + Duration::from_secs(timeout_secs));

        loop {
            self.ensure_open()?;

            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let ready = {
                let mut lists = self.lock();
                attempt(&mut lists)
            };
            if ready.is_some() {
                return Ok(ready);
            }

            let expired = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = notified.as_mut() => {}
                _ = expired => return Ok(None),
                _ = self.closed.cancelled() => return Err(StoreError::Cancelled),
            }
        }
    }
}

impl Default for MemoryListStore {
    fn default() -> Self {
        Self::new()
    }
}

fn pop_back(lists: &mut Lists, db: i64, list: &str) -> Option<Vec<u8>> {
    let key = (db, list.to_string());
    let values = lists.get_mut(&key)?;
    let value = values.pop_back();
    if values.is_empty() {
        lists.remove(&key);
    }
    value
}

#[async_trait]
impl ListStore for MemoryListStore {
    async fn push_head(&self, db: i64, list: &str, value: Vec<u8>) -> StoreResult<()> {
        self.ensure_open()?;
        self.lock()
            .entry((db, list.to_string()))
            .or_default()
            .push_front(value);
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn pop_tail(&self, db: i64, list: &str) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(pop_back(&mut self.lock(), db, list))
    }

    async fn blocking_pop_tail(
        &self,
        db: i64,
        list: &str,
        timeout_secs: u64,
    ) -> StoreResult<Option<Vec<u8>>> {
        self.wait_for(timeout_secs, |lists| pop_back(lists, db, list))
            .await
    }

    async fn blocking_move_tail_to_head(
        &self,
        db: i64,
        source: &str,
        destination: &str,
        timeout_secs: u64,
    ) -> StoreResult<Option<Vec<u8>>> {
        self.wait_for(timeout_secs, |lists| {
            let value = pop_back(lists, db, source)?;
            lists
                .entry((db, destination.to_string()))
                .or_default()
                .push_front(value.clone());
            Some(value)
        })
        .await
    }

    async fn range(
        &self,
        db: i64,
        list: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<Vec<u8>>> {
        self.ensure_open()?;
        let lists = self.lock();
        let Some(values) = lists.get(&(db, list.to_string())) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(values.len(), start, stop) {
            Some((from, to)) => values.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    fn backend_type(&self) -> StoreBackend {
        StoreBackend::Memory
    }
}
