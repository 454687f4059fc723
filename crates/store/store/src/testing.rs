use std::time::Duration;

use keylock_core::Expiry;

use crate::error::StoreError;
use crate::store::{KeyTtl, KvStore, RefreshOutcome, SetCommand, SetMode};

fn key(id: &str) -> String {
    format!("conformance:{id}")
}

/// Run the full key-value store conformance suite.
///
/// Call this from a backend's test module with a fresh store instance. The
/// suite waits on real (or paused tokio) time for the expiry checks.
///
/// # Errors
///
/// Returns an error if a store operation fails.
pub async fn run_store_conformance_tests(store: &dyn KvStore) -> Result<(), StoreError> {
    test_get_missing(store).await?;
    test_set_and_get(store).await?;
    test_set_if_absent(store).await?;
    test_zero_expiry_rejected(store).await?;
    test_delete(store).await?;
    test_exists(store).await?;
    test_pttl(store).await?;
    test_pexpire(store).await?;
    test_mget(store).await?;
    test_pipeline_set(store).await?;
    test_compare_and_delete(store).await?;
    test_compare_and_pexpire(store).await?;
    test_set_or_refresh(store).await?;
    test_entries_expire(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn KvStore) -> Result<(), StoreError> {
    let val = store.get(&key("missing")).await?;
    assert!(val.is_none(), "get on missing key should return None");
    Ok(())
}

async fn test_set_and_get(store: &dyn KvStore) -> Result<(), StoreError> {
    let k = key("set-get");
    let written = store.set(&k, b"hello", Expiry::Never, SetMode::Always).await?;
    assert!(written, "unconditional set should write");
    assert_eq!(store.get(&k).await?.as_deref(), Some(&b"hello"[..]));

    store.set(&k, b"again", Expiry::Never, SetMode::Always).await?;
    assert_eq!(
        store.get(&k).await?.as_deref(),
        Some(&b"again"[..]),
        "unconditional set should overwrite"
    );
    Ok(())
}

async fn test_set_if_absent(store: &dyn KvStore) -> Result<(), StoreError> {
    let k = key("nx");
    let ttl = Expiry::After(Duration::from_secs(60));
    assert!(store.set(&k, b"first", ttl, SetMode::IfAbsent).await?);
    assert!(
        !store.set(&k, b"second", ttl, SetMode::IfAbsent).await?,
        "conditional set on existing key should not write"
    );
    assert_eq!(
        store.get(&k).await?.as_deref(),
        Some(&b"first"[..]),
        "original value should remain"
    );
    Ok(())
}

async fn test_zero_expiry_rejected(store: &dyn KvStore) -> Result<(), StoreError> {
    let result = store
        .set(
            &key("zero-ttl"),
            b"x",
            Expiry::After(Duration::ZERO),
            SetMode::Always,
        )
        .await;
    assert!(
        matches!(result, Err(StoreError::InvalidExpiry(_))),
        "zero expiry should be rejected"
    );
    Ok(())
}

async fn test_delete(store: &dyn KvStore) -> Result<(), StoreError> {
    let k = key("delete");
    store.set(&k, b"bye", Expiry::Never, SetMode::Always).await?;
    assert!(store.delete(&k).await?, "delete should report removal");
    assert!(store.get(&k).await?.is_none());
    assert!(
        !store.delete(&k).await?,
        "delete on missing key should return false"
    );
    Ok(())
}

async fn test_exists(store: &dyn KvStore) -> Result<(), StoreError> {
    let k = key("exists");
    assert!(!store.exists(&k).await?);
    store.set(&k, b"1", Expiry::Never, SetMode::Always).await?;
    assert!(store.exists(&k).await?);
    Ok(())
}

async fn test_pttl(store: &dyn KvStore) -> Result<(), StoreError> {
    assert_eq!(store.pttl(&key("pttl-missing")).await?, KeyTtl::Missing);

    let persistent = key("pttl-persistent");
    store
        .set(&persistent, b"1", Expiry::Never, SetMode::Always)
        .await?;
    assert_eq!(store.pttl(&persistent).await?, KeyTtl::Persistent);

    let timed = key("pttl-timed");
    let ttl = Duration::from_secs(30);
    store
        .set(&timed, b"1", Expiry::After(ttl), SetMode::Always)
        .await?;
    match store.pttl(&timed).await? {
        KeyTtl::Expires(remaining) => assert!(
            remaining <= ttl && remaining > Duration::from_secs(25),
            "remaining ttl {remaining:?} outside (25s, 30s]"
        ),
        other => panic!("expected Expires, got {other:?}"),
    }
    Ok(())
}

async fn test_pexpire(store: &dyn KvStore) -> Result<(), StoreError> {
    assert!(
        !store
            .pexpire(&key("pexpire-missing"), Duration::from_secs(5))
            .await?,
        "pexpire on missing key should return false"
    );

    let k = key("pexpire");
    store.set(&k, b"1", Expiry::Never, SetMode::Always).await?;
    assert!(store.pexpire(&k, Duration::from_secs(10)).await?);
    assert!(matches!(store.pttl(&k).await?, KeyTtl::Expires(_)));
    Ok(())
}

async fn test_mget(store: &dyn KvStore) -> Result<(), StoreError> {
    let a = key("mget-a");
    let c = key("mget-c");
    store.set(&a, b"A", Expiry::Never, SetMode::Always).await?;
    store.set(&c, b"C", Expiry::Never, SetMode::Always).await?;

    let values = store.mget(&[a, key("mget-b"), c]).await?;
    assert_eq!(
        values,
        vec![Some(b"A".to_vec()), None, Some(b"C".to_vec())],
        "mget should keep request order and mark misses"
    );

    let single = store.mget(&[key("mget-a")]).await?;
    assert_eq!(single, vec![Some(b"A".to_vec())]);

    assert!(store.mget(&[]).await?.is_empty());
    Ok(())
}

async fn test_pipeline_set(store: &dyn KvStore) -> Result<(), StoreError> {
    let commands = vec![
        SetCommand {
            key: key("pipe-1"),
            value: b"one".to_vec(),
            expiry: Expiry::Never,
        },
        SetCommand {
            key: key("pipe-2"),
            value: b"two".to_vec(),
            expiry: Expiry::After(Duration::from_secs(60)),
        },
    ];
    store.pipeline_set(&commands).await?;

    assert_eq!(store.get(&key("pipe-1")).await?.as_deref(), Some(&b"one"[..]));
    assert_eq!(store.pttl(&key("pipe-1")).await?, KeyTtl::Persistent);
    assert_eq!(store.get(&key("pipe-2")).await?.as_deref(), Some(&b"two"[..]));
    assert!(matches!(
        store.pttl(&key("pipe-2")).await?,
        KeyTtl::Expires(_)
    ));

    store.pipeline_set(&[]).await?;
    Ok(())
}

async fn test_compare_and_delete(store: &dyn KvStore) -> Result<(), StoreError> {
    let k = key("cad");
    store.set(&k, b"owner-a", Expiry::Never, SetMode::Always).await?;

    assert!(
        !store.compare_and_delete(&k, b"owner-b").await?,
        "mismatched value should not delete"
    );
    assert!(store.exists(&k).await?, "key should survive a foreign delete");

    assert!(store.compare_and_delete(&k, b"owner-a").await?);
    assert!(!store.exists(&k).await?);

    assert!(
        !store.compare_and_delete(&k, b"owner-a").await?,
        "missing key should not delete"
    );
    Ok(())
}

async fn test_compare_and_pexpire(store: &dyn KvStore) -> Result<(), StoreError> {
    let k = key("cap");
    store
        .set(
            &k,
            b"owner-a",
            Expiry::After(Duration::from_secs(5)),
            SetMode::Always,
        )
        .await?;

    assert!(
        !store
            .compare_and_pexpire(&k, b"owner-b", Duration::from_secs(60))
            .await?
    );
    assert!(
        store
            .compare_and_pexpire(&k, b"owner-a", Duration::from_secs(60))
            .await?
    );
    match store.pttl(&k).await? {
        KeyTtl::Expires(remaining) => assert!(remaining > Duration::from_secs(30)),
        other => panic!("expected Expires, got {other:?}"),
    }
    Ok(())
}

async fn test_set_or_refresh(store: &dyn KvStore) -> Result<(), StoreError> {
    let k = key("refresh");
    let outcome = store
        .set_or_refresh(&k, b"v1", Duration::from_secs(10))
        .await?;
    assert_eq!(outcome, RefreshOutcome::Written);

    let outcome = store
        .set_or_refresh(&k, b"v2", Duration::from_secs(60))
        .await?;
    assert_eq!(outcome, RefreshOutcome::Refreshed);
    assert_eq!(
        store.get(&k).await?.as_deref(),
        Some(&b"v1"[..]),
        "refresh should leave the value untouched"
    );
    match store.pttl(&k).await? {
        KeyTtl::Expires(remaining) => assert!(remaining > Duration::from_secs(30)),
        other => panic!("expected Expires, got {other:?}"),
    }
    Ok(())
}

async fn test_entries_expire(store: &dyn KvStore) -> Result<(), StoreError> {
    let k = key("short-lived");
    store
        .set(
            &k,
            b"1",
            Expiry::After(Duration::from_millis(100)),
            SetMode::Always,
        )
        .await?;
    assert!(store.exists(&k).await?);

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(store.get(&k).await?.is_none(), "expired key should read as absent");
    assert_eq!(store.pttl(&k).await?, KeyTtl::Missing);
    assert!(
        store.set(&k, b"2", Expiry::Never, SetMode::IfAbsent).await?,
        "conditional set should succeed once the key expired"
    );
    Ok(())
}
