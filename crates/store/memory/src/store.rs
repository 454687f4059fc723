use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::time::Instant;
use tracing::trace;

use keylock_core::Expiry;
use keylock_store::{
    KeyTtl, KvStore, RefreshOutcome, SetCommand, SetMode, StoreError, expiry_millis,
};

/// A single value in the in-memory store.
#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: &[u8], expires_at: Option<Instant>) -> Self {
        Self {
            value: value.to_vec(),
            expires_at,
        }
    }

    /// Returns `true` if this entry has passed its TTL deadline.
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Deadline `ttl` from now, or `None` if it lies beyond what `Instant` can
/// represent (the entry then never expires).
fn expires_at(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

/// Compute the deadline for an expiry, validating it the way the store would.
fn deadline(expiry: Expiry) -> Result<Option<Instant>, StoreError> {
    expiry_millis(expiry)?;
    Ok(match expiry {
        Expiry::Never => None,
        Expiry::After(d) => expires_at(d),
    })
}

/// In-memory [`KvStore`] backed by a [`DashMap`].
///
/// Entries are lazily evicted when an operation finds them past their TTL.
/// Every conditional operation goes through the map's entry API, which holds
/// the shard lock for the key, so check-and-write pairs are atomic.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: DashMap<String, Entry>,
}

impl MemoryKvStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        self.data.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a live value, evicting it if it has expired.
    fn live_value(&self, key: &str) -> Option<Vec<u8>> {
        let expired = match self.data.get(key) {
            Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.data.remove_if(key, |_, entry| entry.is_expired());
        }
        None
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.live_value(key))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        Ok(keys.iter().map(|k| self.live_value(k)).collect())
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        expiry: Expiry,
        mode: SetMode,
    ) -> Result<bool, StoreError> {
        let expires_at = deadline(expiry)?;

        match (self.data.entry(key.to_owned()), mode) {
            (MapEntry::Occupied(mut occupied), SetMode::IfAbsent) => {
                if !occupied.get().is_expired() {
                    trace!(key, "conditional set skipped, key present");
                    return Ok(false);
                }
                occupied.insert(Entry::new(value, expires_at));
            }
            (MapEntry::Occupied(mut occupied), SetMode::Always) => {
                occupied.insert(Entry::new(value, expires_at));
            }
            (MapEntry::Vacant(vacant), _) => {
                vacant.insert(Entry::new(value, expires_at));
            }
        }
        Ok(true)
    }

    async fn pipeline_set(&self, commands: &[SetCommand]) -> Result<(), StoreError> {
        let mut first_error = None;
        for command in commands {
            let result = self
                .set(&command.key, &command.value, command.expiry, SetMode::Always)
                .await;
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .data
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.live_value(key).is_some())
    }

    async fn pexpire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        match self.data.get_mut(key) {
            Some(mut entry) if !entry.is_expired() => {
                entry.expires_at = expires_at(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let Some(entry) = self.data.get(key) else {
            return Ok(KeyTtl::Missing);
        };
        if entry.is_expired() {
            return Ok(KeyTtl::Missing);
        }
        Ok(match entry.expires_at {
            None => KeyTtl::Persistent,
            Some(at) => KeyTtl::Expires(at.saturating_duration_since(Instant::now())),
        })
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        Ok(self
            .data
            .remove_if(key, |_, entry| {
                !entry.is_expired() && entry.value == expected
            })
            .is_some())
    }

    async fn compare_and_pexpire(
        &self,
        key: &str,
        expected: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        match self.data.get_mut(key) {
            Some(mut entry) if !entry.is_expired() && entry.value == expected => {
                entry.expires_at = expires_at(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_or_refresh(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<RefreshOutcome, StoreError> {
        let expires_at = deadline(Expiry::After(ttl))?;

        match self.data.entry(key.to_owned()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Entry::new(value, expires_at));
                    Ok(RefreshOutcome::Written)
                } else {
                    occupied.get_mut().expires_at = expires_at;
                    Ok(RefreshOutcome::Refreshed)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(value, expires_at));
                Ok(RefreshOutcome::Written)
            }
        }
    }
}
