//! relq Store Library
//!
//! This crate provides the list store abstraction and its implementations. The
//! reliable consumer only needs a handful of list primitives (push at the head, pop
//! from the tail, a blocking tail-to-head move and a range read), so any store
//! offering those can back a queue.
//!
//! # List orientation
//!
//! Producers push at the head and consumers pop at the tail, so lists are FIFO across
//! pushes. Backends must keep the blocking move atomic: a value returned from
//! `blocking_move_tail_to_head` is already stored at the head of the destination list.

pub mod factory;
pub mod memory;
#[cfg(feature = "store-redis")]
pub mod redis_store;
pub mod traits;

// Re-export commonly used types
pub use factory::create_store;
pub use memory::MemoryListStore;
#[cfg(feature = "store-redis")]
pub use redis_store::RedisListStore;
pub use relq_core::StoreBackend;
pub use traits::{ListStore, StoreError, StoreResult};
