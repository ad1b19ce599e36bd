//! Redis counter backend.
//!
//! Uses the native atomic INCR. The TTL is attached by SETEX only on the
//! hit that creates the key, so later hits never extend an in-progress
//! window. Remaining TTL comes straight from the server.

use std::time::Duration;

use parking_lot::Mutex;
use redis::Commands;

use super::{Backend, Hit};
use crate::error::Result;

/// Socket timeout for all backend calls; a rate limit check must fail
/// fast rather than stall the request path.
const IO_TIMEOUT: Duration = Duration::from_millis(1500);

/// Counter backend storing state in Redis, shareable across instances.
pub struct RedisBackend {
    conn: Mutex<redis::Connection>,
}

impl RedisBackend {
    /// Connect to a Redis server, e.g. `redis://127.0.0.1:6379/0`.
    pub fn connect(url: &str) -> Result<RedisBackend> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection()?;
        conn.set_read_timeout(Some(IO_TIMEOUT))?;
        conn.set_write_timeout(Some(IO_TIMEOUT))?;
        Ok(RedisBackend {
            conn: Mutex::new(conn),
        })
    }
}

impl Backend for RedisBackend {
    fn hit(&self, key: &str, ttl_secs: u32) -> Result<Hit> {
        let mut conn = self.conn.lock();
        // TTL is -2 for a missing key and -1 for a key with no expiry;
        // both mean the window is not in progress and must be (re)created.
        let remaining: i64 = conn.ttl(key)?;
        if remaining <= 0 {
            conn.set_ex::<_, _, ()>(key, 1u64, u64::from(ttl_secs))?;
            return Ok(Hit {
                count: 1,
                remaining_ttl: ttl_secs,
            });
        }
        let count: u64 = conn.incr(key, 1u64)?;
        Ok(Hit {
            count,
            remaining_ttl: remaining as u32,
        })
    }
}
