//! Reliable drain loop for a single queue.
//!
//! Every item is moved atomically from the source queue into the consumer's backup
//! list before the callback sees it, and popped from the backup list only after the
//! callback returned successfully. A crash or a failing callback therefore leaves the
//! item in the backup list instead of losing it.
//!
//! Stop is cooperative: [`Consumer::stop`] clears the running flag, which the loop reads
//! before each pop attempt. An in-flight blocking pop is never interrupted, so a stop is
//! honoured within one poll timeout (plus the duration of a callback that is running).

use std::panic::{self, AssertUnwindSafe};
use std::string::FromUtf8Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use relq_store::{ListStore, StoreError, StoreResult};
use tokio::runtime::Handle;
use tracing::Instrument;

use crate::error::ConsumerError;
use crate::identity::InstanceIdentity;
use crate::item::QueueItem;
use crate::outcome::{Completion, CompletionSender, ConsumerOutcome};
use crate::registry::QueueKey;

/// Callback with the item decoding folded in.
pub(crate) type ItemHandler = Box<dyn FnMut(Vec<u8>) -> Result<(), HandlerFailure> + Send>;

pub(crate) enum HandlerFailure {
    Decode(FromUtf8Error),
    Callback(anyhow::Error),
}

/// Wrap a typed callback into an [`ItemHandler`].
pub(crate) fn item_handler<T, F>(mut callback: F) -> ItemHandler
where
    T: QueueItem,
    F: FnMut(T) -> anyhow::Result<()> + Send + 'static,
{
    Box::new(move |raw| {
        let item = T::from_raw(raw).map_err(HandlerFailure::Decode)?;
        callback(item).map_err(HandlerFailure::Callback)
    })
}

enum DrainState {
    Idle,
    Processing(Vec<u8>),
    Acking,
    Stopped,
    Faulted(ConsumerError),
    Cancelled,
}

pub struct Consumer {
    key: QueueKey,
    backup_list: String,
    timeout_secs: u64,
    store: Arc<dyn ListStore>,
    running: AtomicBool,
    terminated: AtomicBool,
    /// Handler and completion writer, taken by the first `start`.
    pending: Mutex<Option<(ItemHandler, CompletionSender)>>,
    completion: Completion,
}

impl Consumer {
    pub(crate) fn new(
        key: QueueKey,
        identity: &InstanceIdentity,
        timeout_secs: u64,
        store: Arc<dyn ListStore>,
        handler: ItemHandler,
    ) -> Arc<Self> {
        let backup_list = identity.backup_list_name(key.queue());
        let (sender, completion) = Completion::channel();

        Arc::new(Self {
            key,
            backup_list,
            timeout_secs,
            store,
            running: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            pending: Mutex::new(Some((handler, sender))),
            completion,
        })
    }

    /// Spawn the drain loop on `runtime`. Only the first call has an effect.
    pub(crate) fn start(self: &Arc<Self>, runtime: &Handle) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some((handler, sender)) = pending else {
            tracing::warn!(
                db = self.key.db(),
                queue = %self.key.queue(),
                "Consumer already started, ignoring start"
            );
            return;
        };

        self.running.store(true, Ordering::SeqCst);

        tracing::info!(
            db = self.key.db(),
            queue = %self.key.queue(),
            backup_list = %self.backup_list,
            timeout_secs = self.timeout_secs,
            "Consumer started"
        );

        let span = tracing::info_span!("consumer", db = self.key.db(), queue = %self.key.queue());
        runtime.spawn(self.clone().drain(handler, sender).instrument(span));
    }

    /// Ask the loop to finish. Returns immediately; observe the end through
    /// [`Consumer::completion`].
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!(
                db = self.key.db(),
                queue = %self.key.queue(),
                "Consumer stop requested"
            );
        }
    }

    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    pub fn backup_list(&self) -> &str {
        &self.backup_list
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the loop has reached a terminal state.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Items currently held in this consumer's backup list, head first.
    pub async fn backup_items(&self) -> StoreResult<Vec<Vec<u8>>> {
        self.store
            .range(self.key.db(), &self.backup_list, 0, -1)
            .await
    }

    async fn drain(self: Arc<Self>, mut handler: ItemHandler, sender: CompletionSender) {
        let mut state = DrainState::Idle;

        let outcome = loop {
            state = match state {
                DrainState::Idle => self.next_item().await,
                DrainState::Processing(raw) => self.process(&mut handler, raw),
                DrainState::Acking => self.acknowledge().await,
                DrainState::Stopped => break ConsumerOutcome::Stopped,
                DrainState::Faulted(err) => break ConsumerOutcome::Failed(Arc::new(err)),
                DrainState::Cancelled => break ConsumerOutcome::Cancelled,
            };
        };

        self.running.store(false, Ordering::SeqCst);
        self.terminated.store(true, Ordering::SeqCst);

        match &outcome {
            ConsumerOutcome::Stopped => tracing::info!("Consumer stopped"),
            ConsumerOutcome::Cancelled => tracing::warn!("Consumer cancelled by the store"),
            ConsumerOutcome::Failed(err) => tracing::error!(
                error = %err,
                backup_list = %self.backup_list,
                "Consumer failed"
            ),
        }

        sender.resolve(outcome);
    }

    async fn next_item(&self) -> DrainState {
        if !self.is_running() {
            return DrainState::Stopped;
        }

        match self
            .store
            .blocking_move_tail_to_head(
                self.key.db(),
                self.key.queue(),
                &self.backup_list,
                self.timeout_secs,
            )
            .await
        {
            Ok(Some(raw)) => {
                tracing::debug!(size_bytes = raw.len(), "Item moved to backup list");
                DrainState::Processing(raw)
            }
            Ok(None) => {
                tracing::trace!("No items available in queue");
                DrainState::Idle
            }
            Err(e) => self.store_failure("blocking_move_tail_to_head", e),
        }
    }

    fn process(&self, handler: &mut ItemHandler, raw: Vec<u8>) -> DrainState {
        let db = self.key.db();
        let queue = self.key.queue().to_string();

        match panic::catch_unwind(AssertUnwindSafe(|| handler(raw))) {
            Ok(Ok(())) => DrainState::Acking,
            Ok(Err(HandlerFailure::Callback(source))) => {
                DrainState::Faulted(ConsumerError::Callback { db, queue, source })
            }
            Ok(Err(HandlerFailure::Decode(source))) => {
                DrainState::Faulted(ConsumerError::Decode { db, queue, source })
            }
            Err(payload) => DrainState::Faulted(ConsumerError::CallbackPanicked {
                db,
                queue,
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    async fn acknowledge(&self) -> DrainState {
        // Only the removal matters; the value read back is the item just processed.
        match self.store.pop_tail(self.key.db(), &self.backup_list).await {
            Ok(_) => {
                tracing::debug!("Item acknowledged");
                DrainState::Idle
            }
            Err(e) => self.store_failure("pop_tail", e),
        }
    }

    fn store_failure(&self, operation: &'static str, err: StoreError) -> DrainState {
        if err.is_cancelled() {
            return DrainState::Cancelled;
        }
        DrainState::Faulted(ConsumerError::Store {
            db: self.key.db(),
            queue: self.key.queue().to_string(),
            operation,
            source: err,
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
