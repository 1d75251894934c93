use crate::MemoryListStore;
#[cfg(feature = "store-redis")]
use crate::RedisListStore;
use crate::{ListStore, StoreBackend, StoreError, StoreResult};
use relq_core::QueueConfig;
use std::sync::Arc;

/// Create a list store based on configuration
pub async fn create_store(config: &QueueConfig) -> StoreResult<Arc<dyn ListStore>> {
    match config.store_backend {
        #[cfg(feature = "store-redis")]
        StoreBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| StoreError::Config("REDIS_URL not configured".to_string()))?;

            let store = RedisListStore::new(url).await?;
            Ok(Arc::new(store))
        }

        #[cfg(not(feature = "store-redis"))]
        StoreBackend::Redis => Err(StoreError::Config(
            "Redis store backend not available (store-redis feature not enabled)".to_string(),
        )),

        StoreBackend::Memory => {
            tracing::warn!("Using in-process memory store; queues are not shared between processes");
            Ok(Arc::new(MemoryListStore::new()))
        }
    }
}
