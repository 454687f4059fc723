use std::time::Duration;

use async_trait::async_trait;

use keylock_core::Expiry;

use crate::error::StoreError;

/// Write condition for [`KvStore::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Overwrite any existing value.
    Always,
    /// Write only if the key does not currently exist.
    IfAbsent,
}

/// Remaining lifetime of a key as reported by [`KvStore::pttl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist (never written, deleted, or expired).
    Missing,
    /// The key exists without an expiration.
    Persistent,
    /// The key expires after the given duration.
    Expires(Duration),
}

/// Result of [`KvStore::set_or_refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The key existed; only its TTL was updated.
    Refreshed,
    /// The key was absent and has been written.
    Written,
}

/// One `SET` inside a pipelined batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCommand {
    pub key: String,
    pub value: Vec<u8>,
    pub expiry: Expiry,
}

/// Byte-oriented key-value store client.
///
/// Every conditional operation (`set` with [`SetMode::IfAbsent`],
/// `compare_and_*`, `set_or_refresh`) must execute atomically on the store
/// side. Implementations must be safe for concurrent use.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// `GET key`. Returns `None` if the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// `MGET keys...`. The reply has one slot per requested key, in order.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError>;

    /// `SET key value [PX ms] [NX]`. Returns `true` if the value was written.
    ///
    /// An [`Expiry::After`] of zero is rejected with
    /// [`StoreError::InvalidExpiry`].
    async fn set(
        &self,
        key: &str,
        value: &[u8],
        expiry: Expiry,
        mode: SetMode,
    ) -> Result<bool, StoreError>;

    /// Send every `SET` in one round trip.
    ///
    /// The batch is not transactional: every command is attempted, and a
    /// failure in one does not undo the others. The first failure is returned
    /// after the whole batch has run.
    async fn pipeline_set(&self, commands: &[SetCommand]) -> Result<(), StoreError>;

    /// `DEL key`. Returns `true` if a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// `EXISTS key`.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// `PEXPIRE key ms`. Returns `false` if the key does not exist.
    async fn pexpire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// `PTTL key`.
    async fn pttl(&self, key: &str) -> Result<KeyTtl, StoreError>;

    /// Delete `key` only if its current value equals `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError>;

    /// Reset the TTL of `key` only if its current value equals `expected`.
    async fn compare_and_pexpire(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// If `key` exists, reset its TTL and leave the value alone; otherwise
    /// write `value` with `ttl`.
    async fn set_or_refresh(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<RefreshOutcome, StoreError>;
}

/// Convert an expiry to whole milliseconds, rejecting a zero TTL.
///
/// Returns `None` for [`Expiry::Never`].
pub fn expiry_millis(expiry: Expiry) -> Result<Option<i64>, StoreError> {
    match expiry {
        Expiry::Never => Ok(None),
        Expiry::After(d) if d.is_zero() => Err(StoreError::InvalidExpiry(
            "expiry must be greater than zero".into(),
        )),
        Expiry::After(d) => Ok(Some(duration_millis(d))),
    }
}

/// Whole milliseconds in `d`, rounded up so sub-millisecond TTLs stay positive.
pub fn duration_millis(d: Duration) -> i64 {
    let ms = d.as_millis() + u128::from(d.subsec_nanos() % 1_000_000 != 0);
    i64::try_from(ms).unwrap_or(i64::MAX)
}
