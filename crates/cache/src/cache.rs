use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use keylock_core::{BatchGet, BatchSet, Codec, Expiry, JsonCodec, KeySpec};
use keylock_store::{KeyTtl, KvStore, RefreshOutcome, SetCommand, SetMode};

use crate::error::CacheError;

/// Typed cache over a [`KvStore`].
///
/// Every operation resolves its key through [`KeySpec::resolve`] and applies
/// the descriptor's TTL unless an override is given. TTL overrides follow one
/// convention throughout: `0` means "no expiry", negative means "do nothing".
pub struct CacheStore<C = JsonCodec> {
    store: Arc<dyn KvStore>,
    codec: C,
}

impl CacheStore<JsonCodec> {
    /// Create a cache that stores values as JSON.
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_codec(store, JsonCodec)
    }
}

impl<C: Codec> CacheStore<C> {
    pub fn with_codec(store: Arc<dyn KvStore>, codec: C) -> Self {
        Self { store, codec }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Read and decode a single value.
    ///
    /// A miss is `Ok(None)`; a value that cannot be decoded as `T` is
    /// [`CacheError::Codec`].
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &dyn KeySpec,
        params: &[&str],
    ) -> Result<Option<T>, CacheError> {
        let key = key.resolve(params)?;
        let Some(bytes) = self.store.get(&key).await? else {
            trace!(%key, "cache miss");
            return Ok(None);
        };
        Ok(Some(self.codec.decode(&bytes)?))
    }

    /// Read many keys in one round trip.
    ///
    /// The result has one slot per request, in request order. Absent entries
    /// and entries that fail to decode are `None`.
    pub async fn multi_get<T: DeserializeOwned>(
        &self,
        requests: &[BatchGet<'_>],
    ) -> Result<Vec<Option<T>>, CacheError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let keys = requests
            .iter()
            .map(BatchGet::resolve)
            .collect::<Result<Vec<_>, _>>()?;

        let values = self.store.mget(&keys).await?;
        Ok(keys
            .iter()
            .zip(values)
            .map(|(key, bytes)| {
                let bytes = bytes?;
                match self.codec.decode(&bytes) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        warn!(%key, error = %e, "dropping undecodable cache entry");
                        None
                    }
                }
            })
            .collect())
    }

    /// Read many keys in one round trip, keeping only the entries that exist
    /// and decode.
    ///
    /// The result may be shorter than `requests` and does not line up with
    /// it positionally. Prefer [`multi_get`](Self::multi_get) when the caller
    /// needs to know which key each value came from.
    pub async fn multi_get_present<T: DeserializeOwned>(
        &self,
        requests: &[BatchGet<'_>],
    ) -> Result<Vec<T>, CacheError> {
        let values = self.multi_get(requests).await?;
        Ok(values.into_iter().flatten().collect())
    }

    /// Write a value with the descriptor's default TTL.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &dyn KeySpec,
        value: &T,
        params: &[&str],
    ) -> Result<bool, CacheError> {
        let ttl_millis = i64::try_from(key.ttl_millis()).unwrap_or(i64::MAX);
        self.set_with_ttl(key, value, ttl_millis, params).await
    }

    /// Write a value with an explicit TTL in milliseconds.
    ///
    /// `0` writes without expiry. A negative TTL or a value that cannot be
    /// encoded skips the write and returns `false`.
    pub async fn set_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &dyn KeySpec,
        value: &T,
        ttl_millis: i64,
        params: &[&str],
    ) -> Result<bool, CacheError> {
        let Ok(ttl_millis) = u64::try_from(ttl_millis) else {
            debug!(
                template = key.template(),
                ttl_millis, "negative ttl, skipping write"
            );
            return Ok(false);
        };
        let key = key.resolve(params)?;
        let bytes = match self.codec.encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%key, error = %e, "cache value could not be encoded");
                return Ok(false);
            }
        };

        let written = self
            .store
            .set(&key, &bytes, Expiry::from_millis(ttl_millis), SetMode::Always)
            .await?;
        debug!(%key, ttl_millis, "cache write");
        Ok(written)
    }

    /// Write every entry through a single pipelined round trip.
    ///
    /// Each entry uses its own TTL override, else its descriptor's TTL.
    /// Entries with a negative TTL or an unencodable value are skipped. Key
    /// resolution is checked for every entry before anything is sent.
    ///
    /// The batch is not transactional. If the store reports a failure, the
    /// other writes in the batch have still been applied.
    ///
    /// Returns the number of writes sent to the store.
    pub async fn batch_set<T: Serialize>(
        &self,
        requests: &[BatchSet<'_, T>],
    ) -> Result<usize, CacheError> {
        let mut commands = Vec::with_capacity(requests.len());
        for request in requests {
            let key = request.resolve()?;
            let Ok(ttl_millis) = u64::try_from(request.effective_ttl_millis()) else {
                debug!(%key, "negative ttl, skipping batch entry");
                continue;
            };
            let value = match self.codec.encode(&request.value) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(%key, error = %e, "skipping batch entry that could not be encoded");
                    continue;
                }
            };
            commands.push(SetCommand {
                key,
                value,
                expiry: Expiry::from_millis(ttl_millis),
            });
        }

        if commands.is_empty() {
            return Ok(0);
        }
        debug!(
            entries = commands.len(),
            skipped = requests.len() - commands.len(),
            "batch cache write"
        );
        self.store.pipeline_set(&commands).await?;
        Ok(commands.len())
    }

    /// Write `value` with the descriptor's TTL if the key is absent, or only
    /// refresh the TTL if it is present.
    pub async fn set_or_refresh_if_present<T: Serialize + ?Sized>(
        &self,
        key: &dyn KeySpec,
        value: &T,
        params: &[&str],
    ) -> Result<Option<RefreshOutcome>, CacheError> {
        let ttl_millis = i64::try_from(key.ttl_millis()).unwrap_or(i64::MAX);
        self.set_or_refresh_if_present_with_ttl(key, value, ttl_millis, params)
            .await
    }

    /// Like [`set_or_refresh_if_present`](Self::set_or_refresh_if_present)
    /// with an explicit TTL.
    ///
    /// The existence check and the write are one store-side operation. A TTL
    /// of zero or less, or a value that cannot be encoded, does nothing and
    /// returns `None`.
    pub async fn set_or_refresh_if_present_with_ttl<T: Serialize + ?Sized>(
        &self,
        key: &dyn KeySpec,
        value: &T,
        ttl_millis: i64,
        params: &[&str],
    ) -> Result<Option<RefreshOutcome>, CacheError> {
        let ttl = match u64::try_from(ttl_millis) {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => {
                debug!(
                    template = key.template(),
                    ttl_millis, "non-positive ttl, skipping refresh"
                );
                return Ok(None);
            }
        };
        let key = key.resolve(params)?;
        let bytes = match self.codec.encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(%key, error = %e, "cache value could not be encoded");
                return Ok(None);
            }
        };

        let outcome = self.store.set_or_refresh(&key, &bytes, ttl).await?;
        debug!(%key, ?outcome, "cache set-or-refresh");
        Ok(Some(outcome))
    }

    pub async fn exists(&self, key: &dyn KeySpec, params: &[&str]) -> Result<bool, CacheError> {
        let key = key.resolve(params)?;
        Ok(self.store.exists(&key).await?)
    }

    /// Whether the key has expired (or was never written).
    ///
    /// A key written without a TTL is never considered expired.
    pub async fn is_expired(
        &self,
        key: &dyn KeySpec,
        params: &[&str],
    ) -> Result<bool, CacheError> {
        Ok(self.ttl(key, params).await? == KeyTtl::Missing)
    }

    /// Remaining lifetime of the key.
    pub async fn ttl(&self, key: &dyn KeySpec, params: &[&str]) -> Result<KeyTtl, CacheError> {
        let key = key.resolve(params)?;
        Ok(self.store.pttl(&key).await?)
    }

    /// Reset the key's TTL to the descriptor's default.
    ///
    /// Returns `false` if the key is absent or the descriptor never expires.
    pub async fn expire(&self, key: &dyn KeySpec, params: &[&str]) -> Result<bool, CacheError> {
        let ttl_millis = i64::try_from(key.ttl_millis()).unwrap_or(i64::MAX);
        self.expire_with_ttl(key, ttl_millis, params).await
    }

    /// Reset the key's TTL to `ttl_millis`.
    ///
    /// A TTL of zero or less does nothing and returns `false`; it never
    /// deletes the key.
    pub async fn expire_with_ttl(
        &self,
        key: &dyn KeySpec,
        ttl_millis: i64,
        params: &[&str],
    ) -> Result<bool, CacheError> {
        let ttl = match u64::try_from(ttl_millis) {
            Ok(ms) if ms > 0 => Duration::from_millis(ms),
            _ => return Ok(false),
        };
        let key = key.resolve(params)?;
        Ok(self.store.pexpire(&key, ttl).await?)
    }

    pub async fn delete(&self, key: &dyn KeySpec, params: &[&str]) -> Result<bool, CacheError> {
        let key = key.resolve(params)?;
        Ok(self.store.delete(&key).await?)
    }
}
