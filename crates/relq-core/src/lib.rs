//! relq Core Library
//!
//! This crate provides the configuration and store backend types that are shared
//! across all relq components.

pub mod config;
pub mod store_types;

// Re-export commonly used types
pub use config::QueueConfig;
pub use store_types::StoreBackend;
