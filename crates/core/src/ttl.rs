use rand_core::{OsRng, RngCore};

/// Add a uniformly random offset in `[0, spread)` to `base`.
///
/// Writing many keys with the same TTL makes them expire together; jitter
/// spreads the expiry out. A zero `spread` returns `base` unchanged.
pub fn jittered_ttl_millis(base: u64, spread: u64) -> u64 {
    if spread == 0 {
        return base;
    }
    base.saturating_add(OsRng.next_u64() % spread)
}
