//! Reliable queue: push, one-shot pop, and continuous consumers with backup lists.
//!
//! Shutdown: [`ReliableQueue::stop`] signals a consumer to stop; it does not wait for
//! the loop. Await the returned [`Completion`] to know when the consumer is done and
//! how it ended.

use std::sync::Arc;

use relq_core::QueueConfig;
use relq_store::{create_store, ListStore};
use tokio::runtime::Handle;

use crate::consumer::{item_handler, Consumer};
use crate::error::QueueError;
use crate::identity::InstanceIdentity;
use crate::item::QueueItem;
use crate::outcome::Completion;
use crate::registry::{ConsumerRegistry, QueueKey};

/// Wait applied to each restore move; the item is known to exist, so it rarely matters.
const RESTORE_TIMEOUT_SECS: u64 = 1;

pub struct ReliableQueue {
    store: Arc<dyn ListStore>,
    identity: InstanceIdentity,
    consumers: Arc<ConsumerRegistry>,
}

impl ReliableQueue {
    /// Create a queue over `store`, naming backup lists after the running process.
    pub fn new(store: Arc<dyn ListStore>) -> Self {
        Self::with_identity(store, InstanceIdentity::current())
    }

    /// Create a queue with an explicit identity. Two queues with different identities
    /// never share backup lists, even within one process.
    pub fn with_identity(store: Arc<dyn ListStore>, identity: InstanceIdentity) -> Self {
        Self {
            store,
            identity,
            consumers: Arc::new(ConsumerRegistry::new()),
        }
    }

    /// Connect to the configured store and apply the configured identity overrides.
    pub async fn from_config(config: &QueueConfig) -> Result<Self, QueueError> {
        let store = create_store(config).await?;
        Ok(Self::with_identity(
            store,
            InstanceIdentity::from_config(config),
        ))
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn store(&self) -> &Arc<dyn ListStore> {
        &self.store
    }

    /// Append a value at the head of the queue.
    pub async fn push(&self, db: i64, queue_name: &str, value: &[u8]) -> Result<(), QueueError> {
        self.push_item(db, queue_name, value.to_vec()).await
    }

    /// Append a text value at the head of the queue.
    pub async fn push_text(&self, db: i64, queue_name: &str, value: &str) -> Result<(), QueueError> {
        self.push_item(db, queue_name, value.to_string()).await
    }

    #[tracing::instrument(skip(self, item))]
    async fn push_item<T: QueueItem>(
        &self,
        db: i64,
        queue_name: &str,
        item: T,
    ) -> Result<(), QueueError> {
        let raw = item.into_raw();
        let size_bytes = raw.len();
        self.store.push_head(db, queue_name, raw).await?;
        tracing::debug!(size_bytes, "Item pushed to queue");
        Ok(())
    }

    /// Pop one value from the tail, waiting up to `timeout_secs`.
    ///
    /// This path does not use a backup list: a value popped here and then lost by the
    /// caller is gone. Use [`ReliableQueue::start`] for at-least-once processing.
    #[tracing::instrument(skip(self))]
    pub async fn pop(
        &self,
        db: i64,
        queue_name: &str,
        timeout_secs: u64,
    ) -> Result<Option<Vec<u8>>, QueueError> {
        Ok(self
            .store
            .blocking_pop_tail(db, queue_name, timeout_secs)
            .await?)
    }

    /// Pop one text value from the tail, waiting up to `timeout_secs`.
    pub async fn pop_text(
        &self,
        db: i64,
        queue_name: &str,
        timeout_secs: u64,
    ) -> Result<Option<String>, QueueError> {
        match self.pop(db, queue_name, timeout_secs).await? {
            Some(raw) => Ok(Some(String::from_raw(raw)?)),
            None => Ok(None),
        }
    }

    /// Start a consumer that hands every item of the queue to `callback` as bytes.
    ///
    /// The callback runs inline on the consumer task; while it runs, no further item is
    /// popped and a stop request is not observed. Returning an error stops the consumer
    /// and leaves the item in the backup list.
    ///
    /// Fails with [`QueueError::DuplicateConsumer`] if the queue already has a consumer.
    pub fn start<F>(
        &self,
        db: i64,
        queue_name: &str,
        timeout_secs: u64,
        callback: F,
    ) -> Result<Completion, QueueError>
    where
        F: FnMut(Vec<u8>) -> anyhow::Result<()> + Send + 'static,
    {
        self.start_with::<Vec<u8>, F>(db, queue_name, timeout_secs, callback)
    }

    /// Start a consumer that hands every item of the queue to `callback` as text.
    ///
    /// An item that is not valid UTF-8 stops the consumer like a callback error would.
    pub fn start_text<F>(
        &self,
        db: i64,
        queue_name: &str,
        timeout_secs: u64,
        callback: F,
    ) -> Result<Completion, QueueError>
    where
        F: FnMut(String) -> anyhow::Result<()> + Send + 'static,
    {
        self.start_with::<String, F>(db, queue_name, timeout_secs, callback)
    }

    fn start_with<T, F>(
        &self,
        db: i64,
        queue_name: &str,
        timeout_secs: u64,
        callback: F,
    ) -> Result<Completion, QueueError>
    where
        T: QueueItem,
        F: FnMut(T) -> anyhow::Result<()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| QueueError::NoRuntime)?;

        let key = QueueKey::new(db, queue_name);
        let consumer = Consumer::new(
            key.clone(),
            &self.identity,
            timeout_secs,
            self.store.clone(),
            item_handler(callback),
        );

        self.consumers.add(key, consumer.clone())?;
        consumer.start(&runtime);
        Ok(consumer.completion())
    }

    /// Signal the queue's consumer to stop and return its completion.
    ///
    /// Fails with [`QueueError::NoActiveConsumer`] if no consumer was started.
    pub fn stop(&self, db: i64, queue_name: &str) -> Result<Completion, QueueError> {
        let consumer = self.consumers.get(&QueueKey::new(db, queue_name))?;
        consumer.stop();
        Ok(consumer.completion())
    }

    /// Forget a terminated consumer so the queue can be started again.
    ///
    /// Fails with [`QueueError::ConsumerStillRunning`] until the consumer's loop ended.
    pub fn release(&self, db: i64, queue_name: &str) -> Result<(), QueueError> {
        let consumer = self.consumers.release(&QueueKey::new(db, queue_name))?;
        tracing::info!(
            db,
            queue = %queue_name,
            backup_list = %consumer.backup_list(),
            "Consumer released"
        );
        Ok(())
    }

    /// Items left in the backup list of the queue's consumer, head first.
    pub async fn backup_items(&self, db: i64, queue_name: &str) -> Result<Vec<Vec<u8>>, QueueError> {
        let consumer = self.consumers.get(&QueueKey::new(db, queue_name))?;
        Ok(consumer.backup_items().await?)
    }

    /// Text variant of [`ReliableQueue::backup_items`].
    pub async fn backup_items_text(
        &self,
        db: i64,
        queue_name: &str,
    ) -> Result<Vec<String>, QueueError> {
        self.backup_items(db, queue_name)
            .await?
            .into_iter()
            .map(|raw| String::from_raw(raw).map_err(QueueError::from))
            .collect()
    }

    /// Contents of the backup list `identity` would use for `queue_name`, head first.
    ///
    /// Works without a registered consumer, so it can inspect instances that died.
    pub async fn inspect_backup(
        &self,
        db: i64,
        queue_name: &str,
        identity: &InstanceIdentity,
    ) -> Result<Vec<Vec<u8>>, QueueError> {
        let backup_list = identity.backup_list_name(queue_name);
        Ok(self.store.range(db, &backup_list, 0, -1).await?)
    }

    /// Move every item of `identity`'s backup list back onto the head of the queue.
    ///
    /// Items are moved oldest first, one atomic move each, so a crash midway loses
    /// nothing. The instance owning the backup list must not be consuming.
    #[tracing::instrument(skip(self, identity), fields(instance = %identity))]
    pub async fn restore_backup(
        &self,
        db: i64,
        queue_name: &str,
        identity: &InstanceIdentity,
    ) -> Result<usize, QueueError> {
        let backup_list = identity.backup_list_name(queue_name);
        let pending = self.store.range(db, &backup_list, 0, -1).await?.len();

        let mut restored = 0;
        while restored < pending {
            let moved = self
                .store
                .blocking_move_tail_to_head(db, &backup_list, queue_name, RESTORE_TIMEOUT_SECS)
                .await?;
            if moved.is_none() {
                break;
            }
            restored += 1;
        }

        tracing::info!(restored, backup_list = %backup_list, "Backup list restored");
        Ok(restored)
    }

    /// Queues that currently have a registered consumer.
    pub fn active_consumers(&self) -> Vec<QueueKey> {
        self.consumers.keys()
    }
}

impl Clone for ReliableQueue {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            identity: self.identity.clone(),
            consumers: self.consumers.clone(),
        }
    }
}
