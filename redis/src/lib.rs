//! Redis primary store for the plan registry.
//!
//! Each decomposed record lives under its composite key as a plain string
//! value holding JSON text:
//!
//! - `plan:{id}` → the full nested aggregate
//! - `membercostshare:{id}`, `planservice:{id}`, `service:{id}` → the
//!   record's own attributes plus `parentId`
//!
//! Keys carry no TTL. One [`ConnectionManager`] is opened at startup and
//! cloned per command; it reconnects on its own after a dropped
//! connection.
//!
//! # Example
//!
//! ```no_run
//! use plan_registry_redis::RedisPrimaryStore;
//! use plan_registry_core::store::PrimaryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisPrimaryStore::new("redis://127.0.0.1:6379").await?;
//! store.set("plan:P1", r#"{"objectId":"P1"}"#.to_string()).await?;
//! # Ok(())
//! # }
//! ```

use plan_registry_core::store::{PrimaryStore, StoreError, StoreFuture};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};

/// Primary store backed by Redis.
#[derive(Clone)]
pub struct RedisPrimaryStore {
    /// Connection manager shared by every command.
    conn_manager: ConnectionManager,
}

impl RedisPrimaryStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Rejected`] for a malformed URL and
    /// [`StoreError::Unavailable`] if the server cannot be reached.
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Rejected(format!("Invalid Redis URL: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("Connected to Redis primary store");
        Ok(Self { conn_manager })
    }

    /// Round-trip a `PING`, for readiness checks.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if Redis does not answer.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("PING", &e))?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisPrimaryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPrimaryStore").finish_non_exhaustive()
    }
}

impl PrimaryStore for RedisPrimaryStore {
    fn get(&self, key: &str) -> StoreFuture<'_, Option<String>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let value: Option<String> =
                conn.get(&key).await.map_err(|e| map_redis_error("GET", &e))?;
            tracing::trace!(key = %key, found = value.is_some(), "Redis GET");
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: String) -> StoreFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .set(&key, value)
                .await
                .map_err(|e| map_redis_error("SET", &e))?;
            tracing::trace!(key = %key, "Redis SET");
            Ok(())
        })
    }

    fn delete(&self, key: &str) -> StoreFuture<'_, u64> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let removed: u64 = conn.del(&key).await.map_err(|e| map_redis_error("DEL", &e))?;
            tracing::trace!(key = %key, removed, "Redis DEL");
            Ok(removed)
        })
    }
}

/// Connection-level failures are `Unavailable`; anything the server
/// answered with (wrong type, bad response) is `Rejected`.
fn map_redis_error(command: &str, error: &RedisError) -> StoreError {
    if error.is_io_error()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
        || error.is_timeout()
    {
        StoreError::Unavailable(format!("Redis {command} failed: {error}"))
    } else {
        StoreError::Rejected(format!("Redis {command} failed: {error}"))
    }
}
