//! Instance identity used to name backup lists.
//!
//! A backup list is named `{host}:{process}:{queue}` so that a list left behind by a
//! crashed process can be attributed to it and told apart from the lists of live
//! processes. Recovery tooling relies on this exact layout.

use relq_core::QueueConfig;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceIdentity {
    host: String,
    process: String,
}

impl InstanceIdentity {
    pub fn new(host: impl Into<String>, process: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            process: process.into(),
        }
    }

    /// Identity of the running process: machine hostname and OS process id.
    pub fn current() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.to_str().map(|s| s.to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Self::new(host, std::process::id().to_string())
    }

    /// Current identity with the host and process parts overridden where configured.
    pub fn from_config(config: &QueueConfig) -> Self {
        let current = Self::current();
        Self {
            host: config.instance_host.clone().unwrap_or(current.host),
            process: config.instance_process.clone().unwrap_or(current.process),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn process(&self) -> &str {
        &self.process
    }

    pub fn backup_list_name(&self, queue_name: &str) -> String {
        format!("{}:{}:{}", self.host, self.process, queue_name)
    }
}

impl fmt::Display for InstanceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.process)
    }
}
