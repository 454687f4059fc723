use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{info, warn};

use keylock_core::{Codec, JsonCodec, KeyDescriptor, KeySpec, LockHandle, generate_owner_token};
use keylock_store::duration_millis;

use crate::config::LockConfig;
use crate::error::LockError;
use crate::manager::LockManager;

/// How a critical section is locked: the key template, an optional fixed
/// owner token and the lock timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSpec {
    key: KeyDescriptor,
    lock_value: Option<String>,
    acquire_timeout: Duration,
}

impl LockSpec {
    /// A lock on `template` with the default timings.
    pub fn new(template: impl Into<String>) -> Self {
        Self::with_config(template, &LockConfig::default())
    }

    /// A lock on `template` with timings taken from `config`.
    pub fn with_config(template: impl Into<String>, config: &LockConfig) -> Self {
        Self {
            key: KeyDescriptor::new(template, config.default_ttl_ms),
            lock_value: None,
            acquire_timeout: config.acquire_timeout(),
        }
    }

    /// A lock on an existing descriptor, using its TTL as the lock expiry.
    pub fn for_key(key: KeyDescriptor, config: &LockConfig) -> Self {
        Self {
            key,
            lock_value: None,
            acquire_timeout: config.acquire_timeout(),
        }
    }

    /// Use a fixed owner token instead of a random one per call.
    #[must_use]
    pub fn lock_value(mut self, value: impl Into<String>) -> Self {
        self.lock_value = Some(value.into());
        self
    }

    /// Lock TTL, rounded up to whole milliseconds.
    #[must_use]
    pub fn expire(mut self, ttl: Duration) -> Self {
        let ttl_millis = u64::try_from(duration_millis(ttl)).unwrap_or(0);
        self.key = KeyDescriptor::new(self.key.template(), ttl_millis);
        self
    }

    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn key(&self) -> &KeyDescriptor {
        &self.key
    }

    pub fn fixed_lock_value(&self) -> Option<&str> {
        self.lock_value.as_deref()
    }

    pub fn expire_after(&self) -> Duration {
        Duration::from_millis(self.key.ttl_millis())
    }

    pub fn acquire_timeout_after(&self) -> Duration {
        self.acquire_timeout
    }
}

/// Runs closures while holding a lock.
///
/// [`with_lock`](Self::with_lock) is the explicit form of a lock-around-call
/// decorator: the caller supplies the key parameters, the interceptor takes
/// the lock, runs the closure and always releases afterwards.
pub struct LockInterceptor<C = JsonCodec> {
    locks: Arc<LockManager<C>>,
}

impl<C> Clone for LockInterceptor<C> {
    fn clone(&self) -> Self {
        Self {
            locks: Arc::clone(&self.locks),
        }
    }
}

impl<C: Codec> LockInterceptor<C> {
    pub fn new(locks: Arc<LockManager<C>>) -> Self {
        Self { locks }
    }

    pub fn locks(&self) -> &LockManager<C> {
        &self.locks
    }

    /// Acquire the lock described by `spec`, run `f`, then release.
    ///
    /// `key_values` fill the placeholders of `spec`'s key template in order.
    /// The lock is released through an owner check whether `f` returns `Ok`,
    /// returns `Err` or panics. A panic resumes after the release.
    ///
    /// Errors, in order of precedence:
    /// - the lock could not be taken within the acquire timeout
    ///   ([`LockError::AcquisitionFailed`]); `f` is not run;
    /// - `f`'s own error;
    /// - the lock was no longer ours at release ([`LockError::ReleaseFailed`]),
    ///   typically because `f` outlived the TTL.
    ///
    /// If the returned future is dropped before completing (for example under
    /// `tokio::time::timeout`), no release is sent and the lock frees when its
    /// TTL runs out.
    pub async fn with_lock<F, Fut, R, E>(
        &self,
        spec: &LockSpec,
        key_values: &[&str],
        f: F,
    ) -> Result<R, E>
    where
        F: FnOnce(LockHandle) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<LockError>,
    {
        let template = spec.key.template();
        if template.trim().is_empty() {
            return Err(LockError::InvalidSpec("lock key template is blank".into()).into());
        }
        let ttl = spec.expire_after();
        if ttl.is_zero() {
            return Err(LockError::NoExpiry(template.to_owned()).into());
        }

        let resolved = spec.key.resolve(key_values).map_err(LockError::from)?;
        let owner = spec
            .lock_value
            .clone()
            .unwrap_or_else(generate_owner_token);
        let encoded = self.locks.encode_owner(&owner).map_err(LockError::from)?;

        let acquired = self
            .locks
            .try_acquire_encoded(&resolved, &encoded, ttl, spec.acquire_timeout)
            .await?;
        if !acquired {
            warn!(key = %resolved, timeout = ?spec.acquire_timeout, "lock acquisition failed");
            return Err(LockError::AcquisitionFailed {
                key: resolved,
                timeout: spec.acquire_timeout,
            }
            .into());
        }
        info!(key = %resolved, ?ttl, "lock acquired");

        let handle = LockHandle::new(resolved.clone(), owner, ttl);
        let outcome = AssertUnwindSafe(async move { f(handle).await })
            .catch_unwind()
            .await;
        let released = self.locks.release_encoded(&resolved, &encoded).await;

        match &released {
            Ok(true) => info!(key = %resolved, "lock released"),
            Ok(false) => warn!(key = %resolved, "lock expired or changed owner before release"),
            Err(e) => warn!(key = %resolved, error = %e, "lock release failed"),
        }

        match outcome {
            Err(panic) => std::panic::resume_unwind(panic),
            Ok(Err(e)) => Err(e),
            Ok(Ok(value)) => match released {
                Ok(true) => Ok(value),
                Ok(false) => Err(LockError::ReleaseFailed { key: resolved }.into()),
                Err(e) => Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use keylock_store::KvStore;
    use keylock_store_memory::MemoryKvStore;

    use super::*;

    #[derive(Debug)]
    enum AppError {
        Lock(LockError),
        OutOfStock,
    }

    impl From<LockError> for AppError {
        fn from(e: LockError) -> Self {
            Self::Lock(e)
        }
    }

    fn interceptor() -> (LockInterceptor, Arc<MemoryKvStore>) {
        let store = Arc::new(MemoryKvStore::new());
        let locks = Arc::new(LockManager::new(store.clone()));
        (LockInterceptor::new(locks), store)
    }

    #[tokio::test]
    async fn runs_the_call_and_releases() {
        let (interceptor, store) = interceptor();
        let spec = LockSpec::new("order:%s:lock");

        let result: Result<u32, AppError> = interceptor
            .with_lock(&spec, &["42"], |handle| {
                let store = store.clone();
                async move {
                    assert_eq!(handle.resolved_key(), "order:42:lock");
                    assert_eq!(handle.owner_token().len(), 32);
                    assert_eq!(handle.ttl(), Duration::from_secs(1));
                    assert!(store.exists("order:42:lock").await.unwrap());
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn fixed_lock_value_is_the_owner() {
        let (interceptor, _) = interceptor();
        let spec = LockSpec::new("job:%s").lock_value("worker-1");

        let owner: Result<String, AppError> = interceptor
            .with_lock(&spec, &["nightly"], |handle| async move {
                Ok(handle.owner_token().to_owned())
            })
            .await;
        assert_eq!(owner.unwrap(), "worker-1");
    }

    #[tokio::test]
    async fn call_error_propagates_after_release() {
        let (interceptor, store) = interceptor();
        let spec = LockSpec::new("order:%s:lock");

        let result: Result<(), AppError> = interceptor
            .with_lock(&spec, &["1"], |_| async { Err(AppError::OutOfStock) })
            .await;

        assert!(matches!(result, Err(AppError::OutOfStock)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn panic_releases_then_resumes() {
        let (interceptor, store) = interceptor();
        let spec = LockSpec::new("order:%s:lock");

        let caught = AssertUnwindSafe(interceptor.with_lock(&spec, &["1"], |_| async {
            if store.is_empty() {
                return Ok::<(), AppError>(());
            }
            panic!("inventory service exploded");
        }))
        .catch_unwind()
        .await;

        assert!(caught.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn contended_lock_fails_without_running_the_call() {
        let (interceptor, _) = interceptor();
        let key = KeyDescriptor::new("order:%s:lock", 10_000);
        assert!(
            interceptor
                .locks()
                .acquire(&key, "holder", Duration::from_secs(10), &["1"])
                .await
                .unwrap()
        );

        let calls = AtomicUsize::new(0);
        let spec = LockSpec::new("order:%s:lock").acquire_timeout(Duration::from_millis(200));
        let result: Result<(), AppError> = interceptor
            .with_lock(&spec, &["1"], |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        match result {
            Err(AppError::Lock(LockError::AcquisitionFailed { key, timeout })) => {
                assert_eq!(key, "order:1:lock");
                assert_eq!(timeout, Duration::from_millis(200));
            }
            other => panic!("expected acquisition failure, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(
            interceptor
                .locks()
                .is_held(&key, "holder", &["1"])
                .await
                .unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_the_ttl_is_a_release_failure() {
        let (interceptor, _) = interceptor();
        let spec = LockSpec::new("report:%s").expire(Duration::from_millis(100));

        let result: Result<(), AppError> = interceptor
            .with_lock(&spec, &["daily"], |_| async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(AppError::Lock(LockError::ReleaseFailed { key })) if key == "report:daily"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn call_error_wins_over_release_failure() {
        let (interceptor, _) = interceptor();
        let spec = LockSpec::new("report:%s").expire(Duration::from_millis(100));

        let result: Result<(), AppError> = interceptor
            .with_lock(&spec, &["daily"], |_| async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                Err(AppError::OutOfStock)
            })
            .await;

        assert!(matches!(result, Err(AppError::OutOfStock)));
    }

    #[tokio::test]
    async fn blank_template_is_invalid() {
        let (interceptor, _) = interceptor();
        let result: Result<(), AppError> = interceptor
            .with_lock(&LockSpec::new("  "), &[], |_| async { Ok(()) })
            .await;
        assert!(matches!(result, Err(AppError::Lock(LockError::InvalidSpec(_)))));
    }

    #[tokio::test]
    async fn zero_expiry_is_rejected() {
        let (interceptor, store) = interceptor();
        let spec = LockSpec::new("order:%s:lock").expire(Duration::ZERO);
        let result: Result<(), AppError> = interceptor
            .with_lock(&spec, &["1"], |_| async { Ok(()) })
            .await;
        assert!(matches!(result, Err(AppError::Lock(LockError::NoExpiry(_)))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn wrong_key_value_count_is_a_key_error() {
        let (interceptor, _) = interceptor();
        let result: Result<(), AppError> = interceptor
            .with_lock(&LockSpec::new("order:%s:lock"), &["1", "2"], |_| async {
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(AppError::Lock(LockError::Key(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn calls_on_one_key_do_not_overlap() {
        let (interceptor, _) = interceptor();
        let spec = LockSpec::new("counter:%s")
            .expire(Duration::from_secs(5))
            .acquire_timeout(Duration::from_secs(5));
        let inside = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::new();

        for _ in 0..4 {
            let interceptor = interceptor.clone();
            let spec = spec.clone();
            let inside = Arc::clone(&inside);
            tasks.push(tokio::spawn(async move {
                interceptor
                    .with_lock(&spec, &["shared"], |_| async move {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        inside.fetch_sub(1, Ordering::SeqCst);
                        Ok::<(), AppError>(())
                    })
                    .await
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }
    }

    #[test]
    fn sub_millisecond_expiry_rounds_up() {
        let spec = LockSpec::new("order:%s:lock").expire(Duration::from_micros(500));
        assert_eq!(spec.expire_after(), Duration::from_millis(1));

        let spec = spec.expire(Duration::from_micros(1_500));
        assert_eq!(spec.expire_after(), Duration::from_millis(2));
    }

    #[tokio::test]
    async fn sub_millisecond_expiry_still_locks() {
        let (interceptor, _) = interceptor();
        let spec = LockSpec::new("order:%s:lock").expire(Duration::from_micros(500));
        let result: Result<(), AppError> = interceptor
            .with_lock(&spec, &["1"], |handle| async move {
                assert_eq!(handle.ttl(), Duration::from_millis(1));
                Ok(())
            })
            .await;
        assert!(!matches!(result, Err(AppError::Lock(LockError::NoExpiry(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_call_leaves_lock_to_expire() {
        let (interceptor, store) = interceptor();
        let spec = LockSpec::new("order:%s:lock");

        let timed_out = tokio::time::timeout(
            Duration::from_millis(100),
            interceptor.with_lock(&spec, &["1"], |_| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<(), AppError>(())
            }),
        )
        .await;
        assert!(timed_out.is_err());
        assert!(store.exists("order:1:lock").await.unwrap());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!store.exists("order:1:lock").await.unwrap());
    }

    #[test]
    fn builder_defaults() {
        let spec = LockSpec::new("order:%s:lock");
        assert_eq!(spec.expire_after(), Duration::from_secs(1));
        assert_eq!(spec.acquire_timeout_after(), Duration::from_secs(3));
        assert_eq!(spec.fixed_lock_value(), None);

        let config = LockConfig {
            default_ttl_ms: 5_000,
            acquire_timeout_ms: 100,
            poll_interval_ms: 10,
        };
        let spec = LockSpec::for_key(KeyDescriptor::new("a:%s", 2_000), &config);
        assert_eq!(spec.expire_after(), Duration::from_secs(2));
        assert_eq!(spec.acquire_timeout_after(), Duration::from_millis(100));
        assert_eq!(spec.key().template(), "a:%s");
    }
}
