use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use keylock_core::{Codec, CodecError, Expiry, JsonCodec, KeySpec};
use keylock_store::{KvStore, SetMode};

use crate::config::LockConfig;
use crate::error::LockError;

/// Pause between acquisition attempts when no other bound applies.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Shortest pause between acquisition attempts.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Acquires and releases locks stored in a [`KvStore`].
///
/// A lock is a key written with `SET NX PX` whose value is the encoded owner
/// token. Only a conditional write can take a lock, so at most one owner
/// holds a given key while it is live. Release and extension compare the
/// stored token store-side in the same step as the delete or `PEXPIRE`.
///
/// Every lock has a TTL. A holder that dies without releasing frees the key
/// when the TTL runs out.
pub struct LockManager<C = JsonCodec> {
    store: Arc<dyn KvStore>,
    codec: C,
    poll_interval: Duration,
}

impl LockManager<JsonCodec> {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_codec(store, JsonCodec)
    }

    /// Create a manager using the poll interval from `config`.
    pub fn from_config(store: Arc<dyn KvStore>, config: &LockConfig) -> Self {
        Self::new(store).with_poll_interval(config.poll_interval())
    }
}

impl<C: Codec> LockManager<C> {
    pub fn with_codec(store: Arc<dyn KvStore>, codec: C) -> Self {
        Self {
            store,
            codec,
            poll_interval: LOCK_POLL_INTERVAL,
        }
    }

    /// Set the upper bound on the pause between acquisition attempts.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Make one attempt to take the lock.
    ///
    /// Returns `false` if another owner holds it or the owner token cannot be
    /// encoded. A zero `ttl` is [`LockError::NoExpiry`].
    pub async fn acquire(
        &self,
        key: &dyn KeySpec,
        owner: &str,
        ttl: Duration,
        params: &[&str],
    ) -> Result<bool, LockError> {
        ensure_ttl(key, ttl)?;
        let resolved = key.resolve(params)?;
        let Some(owner) = self.encode_or_warn(&resolved, owner) else {
            return Ok(false);
        };
        self.acquire_encoded(&resolved, &owner, ttl).await
    }

    /// Retry [`acquire`](Self::acquire) until it succeeds or
    /// `acquire_timeout` has elapsed.
    ///
    /// At least one attempt is always made, so a zero timeout is a single
    /// attempt. Between attempts the task sleeps for the poll interval, capped
    /// at a tenth of the timeout and at the time left. A timeout too large to
    /// turn into a deadline (such as `Duration::MAX`) retries until acquired.
    pub async fn try_acquire(
        &self,
        key: &dyn KeySpec,
        owner: &str,
        ttl: Duration,
        acquire_timeout: Duration,
        params: &[&str],
    ) -> Result<bool, LockError> {
        ensure_ttl(key, ttl)?;
        let resolved = key.resolve(params)?;
        let Some(owner) = self.encode_or_warn(&resolved, owner) else {
            return Ok(false);
        };
        self.try_acquire_encoded(&resolved, &owner, ttl, acquire_timeout)
            .await
    }

    /// Delete the lock key whoever holds it.
    ///
    /// Only safe when no other writer can hold the key; prefer
    /// [`release_if_owner`](Self::release_if_owner).
    pub async fn release(&self, key: &dyn KeySpec, params: &[&str]) -> Result<bool, LockError> {
        let resolved = key.resolve(params)?;
        let released = self.store.delete(&resolved).await?;
        debug!(key = %resolved, released, "unconditional lock release");
        Ok(released)
    }

    /// Delete the lock key only if `owner` holds it.
    ///
    /// Returns `false` if the key is absent or held by someone else; the key
    /// is left untouched in that case.
    pub async fn release_if_owner(
        &self,
        key: &dyn KeySpec,
        owner: &str,
        params: &[&str],
    ) -> Result<bool, LockError> {
        let resolved = key.resolve(params)?;
        let Some(owner) = self.encode_or_warn(&resolved, owner) else {
            return Ok(false);
        };
        self.release_encoded(&resolved, &owner).await
    }

    /// Reset the lock's TTL if `owner` still holds it.
    pub async fn extend(
        &self,
        key: &dyn KeySpec,
        owner: &str,
        ttl: Duration,
        params: &[&str],
    ) -> Result<bool, LockError> {
        ensure_ttl(key, ttl)?;
        let resolved = key.resolve(params)?;
        let Some(owner) = self.encode_or_warn(&resolved, owner) else {
            return Ok(false);
        };
        let extended = self
            .store
            .compare_and_pexpire(&resolved, &owner, ttl)
            .await?;
        debug!(key = %resolved, extended, ?ttl, "lock extend");
        Ok(extended)
    }

    /// Whether `owner` currently holds the lock.
    pub async fn is_held(
        &self,
        key: &dyn KeySpec,
        owner: &str,
        params: &[&str],
    ) -> Result<bool, LockError> {
        let resolved = key.resolve(params)?;
        let Some(owner) = self.encode_or_warn(&resolved, owner) else {
            return Ok(false);
        };
        let current = self.store.get(&resolved).await?;
        Ok(current.is_some_and(|stored| stored == owner))
    }

    pub(crate) fn encode_owner(&self, owner: &str) -> Result<Vec<u8>, CodecError> {
        self.codec.encode(owner)
    }

    fn encode_or_warn(&self, key: &str, owner: &str) -> Option<Vec<u8>> {
        match self.encode_owner(owner) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(%key, error = %e, "lock owner token could not be encoded");
                None
            }
        }
    }

    async fn acquire_encoded(
        &self,
        key: &str,
        owner: &[u8],
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let acquired = self
            .store
            .set(key, owner, Expiry::After(ttl), SetMode::IfAbsent)
            .await?;
        debug!(%key, acquired, ?ttl, "lock attempt");
        Ok(acquired)
    }

    pub(crate) async fn try_acquire_encoded(
        &self,
        key: &str,
        owner: &[u8],
        ttl: Duration,
        acquire_timeout: Duration,
    ) -> Result<bool, LockError> {
        // `None` when the timeout is too large to represent: poll until acquired.
        let deadline = Instant::now().checked_add(acquire_timeout);
        let mut attempts = 0u32;

        loop {
            attempts = attempts.saturating_add(1);
            if self.acquire_encoded(key, owner, ttl).await? {
                return Ok(true);
            }

            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!(%key, attempts, ?acquire_timeout, "lock acquisition timed out");
                        return Ok(false);
                    }
                    deadline - now
                }
                None => acquire_timeout,
            };
            tokio::time::sleep(self.poll_delay(acquire_timeout, remaining)).await;
        }
    }

    pub(crate) async fn release_encoded(
        &self,
        key: &str,
        owner: &[u8],
    ) -> Result<bool, LockError> {
        let released = self.store.compare_and_delete(key, owner).await?;
        debug!(%key, released, "lock release");
        Ok(released)
    }

    fn poll_delay(&self, acquire_timeout: Duration, remaining: Duration) -> Duration {
        self.poll_interval
            .min(acquire_timeout / 10)
            .min(remaining)
            .max(MIN_POLL_INTERVAL)
    }
}

fn ensure_ttl(key: &dyn KeySpec, ttl: Duration) -> Result<(), LockError> {
    if ttl.is_zero() {
        return Err(LockError::NoExpiry(key.template().to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use keylock_core::KeyDescriptor;
    use keylock_store_memory::MemoryKvStore;
    use serde::Serialize;
    use serde::de::DeserializeOwned;

    use super::*;

    const TTL: Duration = Duration::from_millis(1_000);

    fn order_lock() -> KeyDescriptor {
        KeyDescriptor::new("order:%s:lock", 1_000)
    }

    fn manager() -> (LockManager, Arc<MemoryKvStore>) {
        let store = Arc::new(MemoryKvStore::new());
        (LockManager::new(store.clone()), store)
    }

    #[tokio::test]
    async fn owner_checked_release_scenario() {
        let (locks, store) = manager();
        let key = order_lock();

        assert!(locks.acquire(&key, "tokenA", TTL, &["42"]).await.unwrap());
        assert!(!locks.acquire(&key, "tokenB", TTL, &["42"]).await.unwrap());

        assert!(!locks.release_if_owner(&key, "tokenB", &["42"]).await.unwrap());
        assert!(store.exists("order:42:lock").await.unwrap());

        assert!(locks.release_if_owner(&key, "tokenA", &["42"]).await.unwrap());
        assert!(!store.exists("order:42:lock").await.unwrap());
    }

    #[tokio::test]
    async fn stored_value_is_the_encoded_token() {
        let (locks, store) = manager();
        locks
            .acquire(&order_lock(), "tokenA", TTL, &["1"])
            .await
            .unwrap();
        let raw = store.get("order:1:lock").await.unwrap().unwrap();
        assert_eq!(raw, br#""tokenA""#);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquires_have_one_winner() {
        let (locks, _) = manager();
        let locks = Arc::new(locks);
        let mut handles = Vec::new();

        for i in 0..16 {
            let locks = Arc::clone(&locks);
            handles.push(tokio::spawn(async move {
                let owner = format!("worker-{i}");
                locks
                    .acquire(&order_lock(), &owner, Duration::from_secs(30), &["7"])
                    .await
                    .expect("acquire should not fail")
            }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.expect("task should not panic") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_frees_after_ttl() {
        let (locks, _) = manager();
        let key = order_lock();
        assert!(locks.acquire(&key, "a", TTL, &["1"]).await.unwrap());

        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert!(!locks.is_held(&key, "a", &["1"]).await.unwrap());
        assert!(locks.acquire(&key, "b", TTL, &["1"]).await.unwrap());
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let (locks, store) = manager();
        let err = locks
            .acquire(&order_lock(), "a", Duration::ZERO, &["1"])
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::NoExpiry(t) if t == "order:%s:lock"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn key_errors_surface() {
        let (locks, _) = manager();
        let err = locks
            .acquire(&order_lock(), "a", TTL, &["1", "2"])
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Key(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_times_out_after_the_deadline() {
        let (locks, _) = manager();
        let key = order_lock();
        assert!(
            locks
                .acquire(&key, "holder", Duration::from_secs(10), &["1"])
                .await
                .unwrap()
        );

        let start = Instant::now();
        let acquired = locks
            .try_acquire(&key, "waiter", TTL, Duration::from_millis(200), &["1"])
            .await
            .unwrap();
        let waited = start.elapsed();

        assert!(!acquired);
        assert!(waited >= Duration::from_millis(200), "gave up after {waited:?}");
        assert!(waited < Duration::from_millis(300), "waited {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_with_zero_timeout_makes_one_attempt() {
        let (locks, _) = manager();
        let key = order_lock();
        locks.acquire(&key, "holder", TTL, &["1"]).await.unwrap();

        let start = Instant::now();
        let acquired = locks
            .try_acquire(&key, "waiter", TTL, Duration::ZERO, &["1"])
            .await
            .unwrap();
        assert!(!acquired);
        assert_eq!(start.elapsed(), Duration::ZERO);

        assert!(
            locks
                .try_acquire(&key, "other", TTL, Duration::ZERO, &["2"])
                .await
                .unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_succeeds_once_released() {
        let (locks, _) = manager();
        let locks = Arc::new(locks);
        let key = order_lock();
        locks
            .acquire(&key, "holder", Duration::from_secs(10), &["1"])
            .await
            .unwrap();

        let releaser = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(120)).await;
                locks
                    .release_if_owner(&order_lock(), "holder", &["1"])
                    .await
                    .unwrap()
            })
        };

        let start = Instant::now();
        let acquired = locks
            .try_acquire(&key, "waiter", TTL, Duration::from_secs(3), &["1"])
            .await
            .unwrap();
        assert!(acquired);
        assert!(releaser.await.unwrap());
        // Woken by the next poll, well before the timeout.
        assert!(start.elapsed() < Duration::from_millis(200));
        assert!(locks.is_held(&key, "waiter", &["1"]).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_succeeds_once_holder_expires() {
        let (locks, _) = manager();
        let key = order_lock();
        locks
            .acquire(&key, "holder", Duration::from_millis(300), &["1"])
            .await
            .unwrap();

        let acquired = locks
            .try_acquire(&key, "waiter", TTL, Duration::from_secs(1), &["1"])
            .await
            .unwrap();
        assert!(acquired);
    }

    #[tokio::test]
    async fn try_acquire_with_unbounded_timeout() {
        let (locks, _) = manager();
        let key = order_lock();
        let acquired = locks
            .try_acquire(&key, "a", TTL, Duration::MAX, &["1"])
            .await
            .unwrap();
        assert!(acquired);
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_with_unbounded_timeout_waits_for_release() {
        let (locks, _) = manager();
        let key = order_lock();
        locks.acquire(&key, "holder", TTL, &["1"]).await.unwrap();

        // The holder never releases; its TTL frees the key.
        let acquired = locks
            .try_acquire(&key, "waiter", TTL, Duration::MAX, &["1"])
            .await
            .unwrap();
        assert!(acquired);
        assert!(locks.is_held(&key, "waiter", &["1"]).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_lock_ttl_is_held_and_extendable() {
        let (locks, _) = manager();
        let key = order_lock();
        assert!(locks.acquire(&key, "a", Duration::MAX, &["1"]).await.unwrap());
        assert!(locks.extend(&key, "a", Duration::MAX, &["1"]).await.unwrap());

        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert!(locks.is_held(&key, "a", &["1"]).await.unwrap());
        assert!(locks.release_if_owner(&key, "a", &["1"]).await.unwrap());
    }

    #[test]
    fn poll_delay_is_bounded() {
        let locks = LockManager::new(Arc::new(MemoryKvStore::new()));
        let ms = Duration::from_millis;

        assert_eq!(locks.poll_delay(ms(3_000), ms(3_000)), ms(50));
        assert_eq!(locks.poll_delay(ms(200), ms(200)), ms(20));
        assert_eq!(locks.poll_delay(ms(200), ms(7)), ms(7));
        assert_eq!(locks.poll_delay(ms(5), ms(5)), ms(1));
        assert_eq!(locks.poll_delay(Duration::MAX, Duration::MAX), ms(50));
    }

    #[tokio::test]
    async fn unconditional_release_ignores_owner() {
        let (locks, _) = manager();
        let key = order_lock();
        locks.acquire(&key, "a", TTL, &["1"]).await.unwrap();

        assert!(locks.release(&key, &["1"]).await.unwrap());
        assert!(!locks.release(&key, &["1"]).await.unwrap());
    }

    #[tokio::test]
    async fn release_of_absent_lock_is_false() {
        let (locks, _) = manager();
        assert!(
            !locks
                .release_if_owner(&order_lock(), "a", &["1"])
                .await
                .unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn extend_only_for_owner() {
        let (locks, _) = manager();
        let key = order_lock();
        locks.acquire(&key, "a", TTL, &["1"]).await.unwrap();

        let longer = Duration::from_secs(5);
        assert!(!locks.extend(&key, "b", longer, &["1"]).await.unwrap());
        assert!(locks.extend(&key, "a", longer, &["1"]).await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(locks.is_held(&key, "a", &["1"]).await.unwrap());
    }

    /// Refuses to encode anything.
    struct RejectingCodec;

    impl Codec for RejectingCodec {
        fn encode<T: Serialize + ?Sized>(&self, _value: &T) -> Result<Vec<u8>, CodecError> {
            Err(CodecError::Encode("rejected".into()))
        }

        fn decode<T: DeserializeOwned>(&self, _bytes: &[u8]) -> Result<T, CodecError> {
            Err(CodecError::Decode("rejected".into()))
        }
    }

    #[tokio::test]
    async fn unencodable_owner_is_not_acquired() {
        let store = Arc::new(MemoryKvStore::new());
        let locks = LockManager::with_codec(store.clone(), RejectingCodec);

        assert!(!locks.acquire(&order_lock(), "a", TTL, &["1"]).await.unwrap());
        assert!(!locks.release_if_owner(&order_lock(), "a", &["1"]).await.unwrap());
        assert!(store.is_empty());
    }
}
