//! Request admission control: a hit counter with TTL behind a pluggable
//! backend, wrapped into a per-caller rate limiter.
//!
//! The limiter itself holds no counter state; everything lives in the
//! [`Backend`]. Backends are interchangeable: an in-process map for single
//! instances, Redis or memcache for fleets sharing one quota space.
//!
//! Quota exhaustion is an expected outcome, not an error: [`RateLimiter::admit`]
//! reports it as a denied [`Decision`] with headers attached so clients can
//! see their standing. Only a backend outage is an error, and the
//! configured [`Policy`] decides whether that fails closed or open.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

mod memcache;
mod memory;
mod redis;

pub use self::memcache::MemcacheBackend;
pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

/// Contractual response header names.
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// Result of one backend hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Hit count for the key within the current window, including this one.
    pub count: u64,
    /// Seconds until the key's window expires. For the hit that creates a
    /// key this is the full TTL; afterwards it shrinks monotonically.
    pub remaining_ttl: u32,
}

/// A key -> (count, ttl) counter primitive.
///
/// The first hit for a fresh key initializes its counter to 1 with the
/// given TTL. Subsequent hits within the window increment atomically and
/// report the remaining time until expiry. No hit ever extends an
/// in-progress window.
pub trait Backend: Send + Sync {
    fn hit(&self, key: &str, ttl_secs: u32) -> Result<Hit>;
}

/// Behavior when the backend itself is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Fail closed: reject the request with a "try again later" error.
    #[default]
    Block,
    /// Fail open: let the request through as if unlimited.
    Allow,
}

/// Derives the counter key for a caller from its remote address string.
pub type KeyMaker = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Default key derivation: the caller's network address without the port.
/// Strings that do not parse as a socket address pass through unchanged,
/// covering fronts that forward a bare IP from `X-Forwarded-For`.
pub fn default_key(remote: &str) -> String {
    match remote.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => remote.to_string(),
    }
}

/// The three transparency headers attached to every counted response,
/// allowed or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    /// Seconds until the caller's window resets.
    pub reset: u32,
}

impl RateLimitInfo {
    /// Render as (header name, value) pairs for the response.
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, self.remaining.to_string()),
            (HEADER_RESET, self.reset.to_string()),
        ]
    }
}

/// Outcome of an admission check.
///
/// `info` is `None` only when the backend failed and the allow policy let
/// the request through; no fabricated counts are ever reported.
#[derive(Debug)]
pub struct Decision {
    pub allowed: bool,
    pub info: Option<RateLimitInfo>,
}

/// Caps requests per caller per time window.
///
/// Intended use by a request front: call [`RateLimiter::admit`] before the
/// inner handler; attach `info.headers()` to the response; short-circuit
/// with a quota-exceeded response when denied, and with a
/// service-unavailable response on [`Error::BackendUnavailable`].
pub struct RateLimiter {
    backend: Arc<dyn Backend>,
    limit: u64,
    interval_secs: u32,
    policy: Policy,
    key_maker: KeyMaker,
}

impl RateLimiter {
    /// Create a limiter allowing `limit` requests per `interval` per key.
    pub fn new(backend: Arc<dyn Backend>, limit: u64, interval: Duration) -> RateLimiter {
        RateLimiter {
            backend,
            limit,
            interval_secs: interval.as_secs().min(u32::MAX as u64) as u32,
            policy: Policy::default(),
            key_maker: Box::new(|remote| default_key(remote)),
        }
    }

    /// Set the backend-failure policy.
    pub fn with_policy(mut self, policy: Policy) -> RateLimiter {
        self.policy = policy;
        self
    }

    /// Replace the key derivation function.
    pub fn with_key_maker(
        mut self,
        key_maker: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> RateLimiter {
        self.key_maker = Box::new(key_maker);
        self
    }

    /// Check whether the caller at `remote` is within quota.
    ///
    /// A count equal to the limit is the last permitted request; anything
    /// beyond is denied with `remaining == 0`. The error case is reserved
    /// for backend failure under the block policy.
    pub fn admit(&self, remote: &str) -> Result<Decision> {
        let key = (self.key_maker)(remote);
        let hit = match self.backend.hit(&key, self.interval_secs) {
            Ok(hit) => hit,
            Err(e) => {
                log::warn!("rate limit backend failed for key {:?}: {}", key, e);
                return match self.policy {
                    Policy::Block => Err(Error::BackendUnavailable(Box::new(e))),
                    Policy::Allow => Ok(Decision {
                        allowed: true,
                        info: None,
                    }),
                };
            }
        };
        let info = RateLimitInfo {
            limit: self.limit,
            remaining: self.limit.saturating_sub(hit.count),
            reset: hit.remaining_ttl,
        };
        Ok(Decision {
            allowed: hit.count <= self.limit,
            info: Some(info),
        })
    }
}
