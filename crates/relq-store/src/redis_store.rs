use crate::traits::{ListStore, StoreError, StoreResult};
use crate::StoreBackend;
use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{Client, RedisError};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Redis list store
///
/// Each database index gets its own client, since Redis selects the database per
/// connection. Non-blocking commands share one [`ConnectionManager`] per database,
/// which reconnects on its own. Blocking commands (`BRPOP`, `BRPOPLPUSH`) hold the
/// connection they are sent on until they return, so each one checks out a dedicated
/// connection and never stalls other callers. Checked-out connections go back to an
/// idle set after a successful command and are dropped after an error.
pub struct RedisListStore {
    client: Client,
    managers: Mutex<HashMap<i64, ConnectionManager>>,
    idle_blocking: Mutex<HashMap<i64, Vec<MultiplexedConnection>>>,
}

impl RedisListStore {
    /// Create a new RedisListStore instance
    ///
    /// # Arguments
    /// * `url` - Redis connection string (e.g., "redis://127.0.0.1:6379")
    pub async fn new(url: &str) -> StoreResult<Self> {
        let client = Client::open(url).map_err(|e| StoreError::Config(e.to_string()))?;

        let store = RedisListStore {
            client,
            managers: Mutex::new(HashMap::new()),
            idle_blocking: Mutex::new(HashMap::new()),
        };

        // Fail fast on an unreachable server rather than on the first queue operation.
        store.manager(0).await?;

        tracing::info!(url = %url, "Connected to redis list store");
        Ok(store)
    }

    fn client_for(&self, db: i64) -> StoreResult<Client> {
        let mut info = self.client.get_connection_info().clone();
        info.redis.db = db;
        Client::open(info).map_err(|e| StoreError::Config(e.to_string()))
    }

    async fn manager(&self, db: i64) -> StoreResult<ConnectionManager> {
        let mut managers = self.managers.lock().await;
        if let Some(manager) = managers.get(&db) {
            return Ok(manager.clone());
        }

        let manager = ConnectionManager::new(self.client_for(db)?)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        managers.insert(db, manager.clone());
        Ok(manager)
    }

    async fn checkout_blocking(&self, db: i64) -> StoreResult<MultiplexedConnection> {
        let idle = self
            .idle_blocking
            .lock()
            .await
            .get_mut(&db)
            .and_then(Vec::pop);
        if let Some(conn) = idle {
            return Ok(conn);
        }

        tracing::debug!(db, "Opening blocking redis connection");
        self.client_for(db)?
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    async fn checkin_blocking(&self, db: i64, conn: MultiplexedConnection) {
        self.idle_blocking
            .lock()
            .await
            .entry(db)
            .or_default()
            .push(conn);
    }

    /// Blocking connections for `db` currently parked between commands.
    pub async fn idle_blocking_connections(&self, db: i64) -> usize {
        self.idle_blocking
            .lock()
            .await
            .get(&db)
            .map_or(0, Vec::len)
    }
}

fn command_error(command: &'static str, err: RedisError) -> StoreError {
    if err.is_connection_dropped() {
        tracing::warn!(command, error = %err, "Redis connection dropped during command");
        return StoreError::Cancelled;
    }
    if err.is_io_error() || err.is_connection_refusal() {
        return StoreError::Connection(err.to_string());
    }
    StoreError::command(command, err.to_string())
}

#[async_trait]
impl ListStore for RedisListStore {
    async fn push_head(&self, db: i64, list: &str, value: Vec<u8>) -> StoreResult<()> {
        let mut conn = self.manager(db).await?;
        let _len: i64 = redis::cmd("LPUSH")
            .arg(list)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("LPUSH", e))?;
        Ok(())
    }

    async fn pop_tail(&self, db: i64, list: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.manager(db).await?;
        let value: Option<Vec<u8>> = redis::cmd("RPOP")
            .arg(list)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("RPOP", e))?;
        Ok(value)
    }

    async fn blocking_pop_tail(
        &self,
        db: i64,
        list: &str,
        timeout_secs: u64,
    ) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.checkout_blocking(db).await?;
        let popped: Option<(String, Vec<u8>)> = redis::cmd("BRPOP")
            .arg(list)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("BRPOP", e))?;
        self.checkin_blocking(db, conn).await;
        Ok(popped.map(|(_, value)| value))
    }

    async fn blocking_move_tail_to_head(
        &self,
        db: i64,
        source: &str,
        destination: &str,
        timeout_secs: u64,
    ) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.checkout_blocking(db).await?;
        let value: Option<Vec<u8>> = redis::cmd("BRPOPLPUSH")
            .arg(source)
            .arg(destination)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("BRPOPLPUSH", e))?;
        self.checkin_blocking(db, conn).await;
        Ok(value)
    }

    async fn range(
        &self,
        db: i64,
        list: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<Vec<u8>>> {
        let mut conn = self.manager(db).await?;
        let values: Vec<Vec<u8>> = redis::cmd("LRANGE")
            .arg(list)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await
            .map_err(|e| command_error("LRANGE", e))?;
        Ok(values)
    }

    fn backend_type(&self) -> StoreBackend {
        StoreBackend::Redis
    }
}
