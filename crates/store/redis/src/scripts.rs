/// Lua script for deleting a key only when its value matches.
///
/// KEYS\[1\] = the key
/// ARGV\[1\] = expected value
///
/// Returns 1 if deleted, 0 if the key is absent or holds another value.
pub const COMPARE_AND_DELETE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Lua script for resetting a key's TTL only when its value matches.
///
/// KEYS\[1\] = the key
/// ARGV\[1\] = expected value
/// ARGV\[2\] = new TTL in milliseconds
///
/// Returns 1 if the TTL was reset, 0 otherwise.
pub const COMPARE_AND_PEXPIRE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
";

/// Lua script for refreshing a key's TTL if present, writing it otherwise.
///
/// KEYS\[1\] = the key
/// ARGV\[1\] = value to write when absent
/// ARGV\[2\] = TTL in milliseconds
///
/// Returns 1 if an existing key was refreshed, 0 if the value was written.
pub const SET_OR_REFRESH: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
return 0
";
