//! Memcache counter backend.
//!
//! Memcached has no query for a key's remaining TTL, so the expiry instant
//! is stashed in a sibling `<key>#exp` entry when the window is created,
//! and the remaining TTL is computed client-side as `stored expiry - now`.
//! The counter key itself stays numeric so the native atomic increment
//! applies.

use std::time::{SystemTime, UNIX_EPOCH};

use memcache::{CommandError, MemcacheError};

use super::{Backend, Hit};
use crate::error::Result;

/// Counter backend storing state in memcached, shareable across instances.
pub struct MemcacheBackend {
    client: memcache::Client,
}

impl MemcacheBackend {
    /// Connect to a memcached server, e.g. `memcache://127.0.0.1:11211`.
    pub fn connect(url: &str) -> Result<MemcacheBackend> {
        let client = memcache::Client::connect(url)?;
        Ok(MemcacheBackend { client })
    }

    fn create(&self, key: &str, ttl_secs: u32) -> Result<Hit> {
        let expires_at = unix_now() + u64::from(ttl_secs);
        self.client.set(key, "1", ttl_secs)?;
        self.client
            .set(&expiry_key(key), expires_at.to_string(), ttl_secs)?;
        Ok(Hit {
            count: 1,
            remaining_ttl: ttl_secs,
        })
    }
}

impl Backend for MemcacheBackend {
    fn hit(&self, key: &str, ttl_secs: u32) -> Result<Hit> {
        let existing: Option<String> = self.client.get(key)?;
        if existing.is_none() {
            return self.create(key, ttl_secs);
        }
        // The key can expire between the get and the increment; recreate
        // the window on a miss. Any other increment error propagates, so a
        // transient failure never restarts an in-progress window.
        let count = match self.client.increment(key, 1) {
            Ok(count) => count,
            Err(e) if is_miss(&e) => return self.create(key, ttl_secs),
            Err(e) => return Err(e.into()),
        };
        let stored: Option<String> = self.client.get(&expiry_key(key))?;
        let remaining_ttl = stored
            .and_then(|s| s.parse::<u64>().ok())
            .map(|expires_at| expires_at.saturating_sub(unix_now()))
            .unwrap_or(0) as u32;
        Ok(Hit {
            count,
            remaining_ttl,
        })
    }
}

fn expiry_key(key: &str) -> String {
    format!("{}#exp", key)
}

fn is_miss(err: &MemcacheError) -> bool {
    matches!(err, MemcacheError::CommandError(CommandError::KeyNotFound))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_key_suffix() {
        assert_eq!(expiry_key("10.0.0.9"), "10.0.0.9#exp");
    }

    #[test]
    fn test_only_a_miss_recreates_the_window() {
        let miss = MemcacheError::CommandError(CommandError::KeyNotFound);
        assert!(is_miss(&miss));
        // Any other increment failure must propagate instead of resetting
        // an in-progress window to count=1 with a fresh TTL.
        let other = MemcacheError::CommandError(CommandError::InvalidArguments);
        assert!(!is_miss(&other));
    }

    #[test]
    #[ignore = "requires a local memcached server"]
    fn test_hit_window_against_live_server() {
        let backend = MemcacheBackend::connect("memcache://127.0.0.1:11211").unwrap();
        let key = format!("ipgeo-test-{}", std::process::id());
        let first = backend.hit(&key, 2).unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.remaining_ttl, 2);
        let second = backend.hit(&key, 2).unwrap();
        assert_eq!(second.count, 2);
        assert!(second.remaining_ttl <= 2);
    }
}
