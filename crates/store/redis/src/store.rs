use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::{AsyncCommands, RedisError, Script};
use tracing::debug;

use keylock_core::Expiry;
use keylock_store::{
    KeyTtl, KvStore, RefreshOutcome, SetCommand, SetMode, StoreError, duration_millis,
    expiry_millis,
};

use crate::config::RedisConfig;
use crate::scripts;

/// Classify a Redis error as a connectivity failure or a command failure.
fn map_redis_error(e: RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

/// Redis-backed implementation of [`KvStore`].
///
/// Plain commands map one to one onto Redis commands. The compare-and-*
/// operations and `set_or_refresh` run as Lua scripts so the read and the
/// write happen in one server-side step.
pub struct RedisKvStore {
    pool: Pool,
    prefix: Option<String>,
    compare_and_delete: Script,
    compare_and_pexpire: Script,
    set_or_refresh: Script,
}

impl RedisKvStore {
    /// Create a new `RedisKvStore` from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map(|b| {
                b.max_size(config.pool_size)
                    .wait_timeout(Some(config.connection_timeout()))
                    .runtime(Runtime::Tokio1)
                    .build()
            })
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            pool,
            prefix: config.prefix.clone(),
            compare_and_delete: Script::new(scripts::COMPARE_AND_DELETE),
            compare_and_pexpire: Script::new(scripts::COMPARE_AND_PEXPIRE),
            set_or_refresh: Script::new(scripts::SET_OR_REFRESH),
        })
    }

    /// Apply the configured prefix to a key.
    fn redis_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{key}"),
            None => key.to_owned(),
        }
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(self.redis_key(key))
            .await
            .map_err(map_redis_error)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let redis_keys: Vec<String> = keys.iter().map(|k| self.redis_key(k)).collect();

        // Always issue MGET explicitly: a single-key request must still come
        // back as a one-element array.
        let mut conn = self.conn().await?;
        redis::cmd("MGET")
            .arg(&redis_keys)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        expiry: Expiry,
        mode: SetMode,
    ) -> Result<bool, StoreError> {
        let ttl_ms = expiry_millis(expiry)?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(self.redis_key(key)).arg(value);
        if let Some(ms) = ttl_ms {
            cmd.arg("PX").arg(ms);
        }
        if mode == SetMode::IfAbsent {
            cmd.arg("NX");
        }

        let mut conn = self.conn().await?;
        let reply: redis::Value = cmd.query_async(&mut conn).await.map_err(map_redis_error)?;

        // `SET ... NX` replies nil when the key already exists.
        Ok(!matches!(reply, redis::Value::Nil))
    }

    async fn pipeline_set(&self, commands: &[SetCommand]) -> Result<(), StoreError> {
        if commands.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for command in commands {
            let ttl_ms = expiry_millis(command.expiry)?;
            pipe.cmd("SET")
                .arg(self.redis_key(&command.key))
                .arg(&command.value);
            if let Some(ms) = ttl_ms {
                pipe.arg("PX").arg(ms);
            }
            pipe.ignore();
        }

        debug!(commands = commands.len(), "sending pipelined SET batch");
        let mut conn = self.conn().await?;
        pipe.exec_async(&mut conn).await.map_err(map_redis_error)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let deleted: i64 = conn
            .del(self.redis_key(key))
            .await
            .map_err(map_redis_error)?;
        Ok(deleted > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        conn.exists(self.redis_key(key))
            .await
            .map_err(map_redis_error)
    }

    async fn pexpire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(self.redis_key(key))
            .arg(duration_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(updated == 1)
    }

    async fn pttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let mut conn = self.conn().await?;
        let ms: i64 = redis::cmd("PTTL")
            .arg(self.redis_key(key))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        // PTTL replies -2 for a missing key and -1 for a key without a TTL.
        Ok(match ms {
            -1 => KeyTtl::Persistent,
            ms if ms < 0 => KeyTtl::Missing,
            ms => KeyTtl::Expires(Duration::from_millis(ms.unsigned_abs())),
        })
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let deleted: i64 = self
            .compare_and_delete
            .key(self.redis_key(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(deleted == 1)
    }

    async fn compare_and_pexpire(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let updated: i64 = self
            .compare_and_pexpire
            .key(self.redis_key(key))
            .arg(expected)
            .arg(duration_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(updated == 1)
    }

    async fn set_or_refresh(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<RefreshOutcome, StoreError> {
        if ttl.is_zero() {
            return Err(StoreError::InvalidExpiry(
                "expiry must be greater than zero".into(),
            ));
        }
        let ttl_ms = duration_millis(ttl);

        let mut conn = self.conn().await?;
        let refreshed: i64 = self
            .set_or_refresh
            .key(self.redis_key(key))
            .arg(value)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(if refreshed == 1 {
            RefreshOutcome::Refreshed
        } else {
            RefreshOutcome::Written
        })
    }
}
