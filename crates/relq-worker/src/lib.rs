//! relq Worker – reliable queue consumers.
//!
//! This crate provides [`ReliableQueue`], which pushes to and pops from list-backed
//! queues and runs at most one consumer per queue. A consumer moves each item into a
//! per-process backup list before handing it to the callback and removes it only once
//! the callback succeeded, so failed or interrupted items can be recovered from the
//! backup list instead of being lost.

mod consumer;
mod error;
mod identity;
mod item;
mod outcome;
mod queue;
mod registry;

pub use consumer::Consumer;
pub use error::{ConsumerError, QueueError};
pub use identity::InstanceIdentity;
pub use item::QueueItem;
pub use outcome::{Completion, ConsumerOutcome};
pub use queue::ReliableQueue;
pub use registry::QueueKey;
