#![allow(dead_code)]

use async_trait::async_trait;
use relq_store::{ListStore, MemoryListStore, StoreBackend, StoreError, StoreResult};
use relq_worker::{InstanceIdentity, ReliableQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_DB: i64 = 0;
pub const ONE_SECOND: u64 = 1;
pub const QUEUE: &str = "test:queue";

/// Test queue over a fresh memory store
pub struct TestQueue {
    pub queue: ReliableQueue,
    pub store: Arc<MemoryListStore>,
}

impl TestQueue {
    pub fn backup_list(&self, queue_name: &str) -> String {
        self.queue.identity().backup_list_name(queue_name)
    }

    /// Contents of this instance's backup list for `queue_name`, read straight from the store.
    pub async fn backup_contents(&self, queue_name: &str) -> Vec<String> {
        self.store
            .range(DEFAULT_DB, &self.backup_list(queue_name), 0, -1)
            .await
            .expect("range on backup list")
            .into_iter()
            .map(|raw| String::from_utf8(raw).expect("utf-8 backup item"))
            .collect()
    }
}

pub fn setup_queue() -> TestQueue {
    let store = Arc::new(MemoryListStore::new());
    let queue = ReliableQueue::with_identity(store.clone(), InstanceIdentity::new("test-host", "1"));
    TestQueue { queue, store }
}

/// Channel-backed callback sink; the callback side never blocks.
pub fn collector<T: Send + 'static>() -> (
    impl FnMut(T) -> anyhow::Result<()> + Send + 'static,
    mpsc::UnboundedReceiver<T>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = move |item: T| {
        let _ = tx.send(item);
        Ok(())
    };
    (callback, rx)
}

/// Receive `count` items or give up after `within`.
pub async fn receive<T>(rx: &mut mpsc::UnboundedReceiver<T>, count: usize, within: Duration) -> Vec<T> {
    let mut items = Vec::with_capacity(count);
    let _ = tokio::time::timeout(within, async {
        while items.len() < count {
            match rx.recv().await {
                Some(item) => items.push(item),
                None => break,
            }
        }
    })
    .await;
    items
}

/// Memory store whose moves and backup acknowledgements can be made to fail.
pub struct FaultyStore {
    inner: MemoryListStore,
    fail_ack: AtomicBool,
    cancel_ack: AtomicBool,
    fail_move: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryListStore::new(),
            fail_ack: AtomicBool::new(false),
            cancel_ack: AtomicBool::new(false),
            fail_move: AtomicBool::new(false),
        }
    }

    /// `pop_tail` fails with a connection error.
    pub fn fail_acks(&self) {
        self.fail_ack.store(true, Ordering::SeqCst);
    }

    /// `pop_tail` reports a cancelled call.
    pub fn cancel_acks(&self) {
        self.cancel_ack.store(true, Ordering::SeqCst);
    }

    /// `blocking_move_tail_to_head` fails with a connection error.
    pub fn fail_moves(&self) {
        self.fail_move.store(true, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryListStore {
        &self.inner
    }
}

#[async_trait]
impl ListStore for FaultyStore {
    async fn push_head(&self, db: i64, list: &str, value: Vec<u8>) -> StoreResult<()> {
        self.inner.push_head(db, list, value).await
    }

    async fn pop_tail(&self, db: i64, list: &str) -> StoreResult<Option<Vec<u8>>> {
        if self.cancel_ack.load(Ordering::SeqCst) {
            return Err(StoreError::Cancelled);
        }
        if self.fail_ack.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("connection reset by peer".to_string()));
        }
        self.inner.pop_tail(db, list).await
    }

    async fn blocking_pop_tail(
        &self,
        db: i64,
        list: &str,
        timeout_secs: u64,
    ) -> StoreResult<Option<Vec<u8>>> {
        self.inner.blocking_pop_tail(db, list, timeout_secs).await
    }

    async fn blocking_move_tail_to_head(
        &self,
        db: i64,
        source: &str,
        destination: &str,
        timeout_secs: u64,
    ) -> StoreResult<Option<Vec<u8>>> {
        if self.fail_move.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("connection refused".to_string()));
        }
        self.inner
            .blocking_move_tail_to_head(db, source, destination, timeout_secs)
            .await
    }

    async fn range(&self, db: i64, list: &str, start: i64, stop: i64) -> StoreResult<Vec<Vec<u8>>> {
        self.inner.range(db, list, start, stop).await
    }

    fn backend_type(&self) -> StoreBackend {
        StoreBackend::Memory
    }
}
