//! Environment variable helpers.
//!
//! Every tunable in the VPA tools is read from a `VPA_*` variable with a
//! compiled-in fallback.
//!
//! ```ignore
//! use vpa_core::env::{env_get, env_get_key, env_get_millis};
//!
//! let delay = env_get_millis("VPA_AUTH_FAIL_DELAY_MS", 3000);
//! let key = env_get_key("VPA_SHM_KEY", 0x5164);
//! let backlog: i32 = env_get("VPA_LISTEN_BACKLOG", 5);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// `"1"`, `"true"`, `"yes"` and `"on"` (any case) are true. Any other set
/// value is false; unset yields `default`.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// String value, or `default` when unset. Empty strings count as set.
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// IPC key, written either as `0x`-prefixed hex or as decimal.
pub fn env_get_key(key: &str, default: i32) -> i32 {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_key(&v))
        .unwrap_or(default)
}

/// Millisecond count as a `Duration`.
pub fn env_get_millis(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}

/// Parse an IPC key. Hex values above `i32::MAX` wrap the way `key_t`
/// does in C (`0xffffffff` is `-1`).
pub fn parse_key(s: &str) -> Option<i32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok().map(|v| v as i32),
        None => s.parse().ok(),
    }
}
