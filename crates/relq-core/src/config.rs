//! Configuration module
//!
//! This module provides the configuration for relq processes: which list store to
//! connect to, the default database index and poll timeout, and optional overrides
//! for the instance identity used to name backup lists.

use std::env;

use crate::store_types::StoreBackend;

// Common constants
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_DB: i64 = 0;
const POLL_TIMEOUT_SECS: u64 = 1;

/// Queue configuration
#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub environment: String,
    pub store_backend: StoreBackend,
    pub redis_url: Option<String>,
    pub default_db: i64,
    /// Timeout in whole seconds handed to blocking pops. 0 would block forever.
    pub poll_timeout_secs: u64,
    /// Overrides the hostname part of backup list names.
    pub instance_host: Option<String>,
    /// Overrides the process part of backup list names.
    pub instance_process: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            store_backend: StoreBackend::Redis,
            redis_url: Some(DEFAULT_REDIS_URL.to_string()),
            default_db: DEFAULT_DB,
            poll_timeout_secs: POLL_TIMEOUT_SECS,
            instance_host: None,
            instance_process: None,
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = var("ENVIRONMENT")
            .or_else(|| var("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let store_backend = match var("RELQ_STORE_BACKEND") {
            Some(s) => s.parse::<StoreBackend>()?,
            None => StoreBackend::Redis,
        };

        let redis_url = var("REDIS_URL")
            .filter(|s| !s.trim().is_empty())
            .or_else(|| match store_backend {
                StoreBackend::Redis => Some(DEFAULT_REDIS_URL.to_string()),
                StoreBackend::Memory => None,
            });

        let config = QueueConfig {
            environment,
            store_backend,
            redis_url,
            default_db: var("RELQ_DEFAULT_DB")
                .unwrap_or_else(|| DEFAULT_DB.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RELQ_DEFAULT_DB must be a valid number"))?,
            poll_timeout_secs: var("RELQ_POLL_TIMEOUT_SECS")
                .unwrap_or_else(|| POLL_TIMEOUT_SECS.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("RELQ_POLL_TIMEOUT_SECS must be a valid number"))?,
            instance_host: var("RELQ_INSTANCE_HOST").filter(|s| !s.is_empty()),
            instance_process: var("RELQ_INSTANCE_PROCESS").filter(|s| !s.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.store_backend == StoreBackend::Redis {
            match self.redis_url.as_deref() {
                None => {
                    return Err(anyhow::anyhow!(
                        "REDIS_URL must be set when using the redis store backend"
                    ))
                }
                Some(url) if !url.starts_with("redis://") && !url.starts_with("rediss://") => {
                    return Err(anyhow::anyhow!(
                        "REDIS_URL must be a redis:// or rediss:// connection string"
                    ))
                }
                Some(_) => {}
            }
        }

        if self.default_db < 0 {
            return Err(anyhow::anyhow!("RELQ_DEFAULT_DB must not be negative"));
        }

        // A zero timeout blocks forever and the consumer could never observe a stop request.
        if self.poll_timeout_secs == 0 {
            return Err(anyhow::anyhow!("RELQ_POLL_TIMEOUT_SECS must be at least 1"));
        }

        // ':' separates the parts of a backup list name.
        if self.instance_host.as_deref().is_some_and(|h| h.contains(':')) {
            return Err(anyhow::anyhow!("RELQ_INSTANCE_HOST must not contain ':'"));
        }
        if self.instance_process.as_deref().is_some_and(|p| p.contains(':')) {
            return Err(anyhow::anyhow!("RELQ_INSTANCE_PROCESS must not contain ':'"));
        }

        Ok(())
    }
}
