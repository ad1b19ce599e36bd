//! In-process counter backend.
//!
//! A mutex-guarded map plus a background sweep that evicts expired keys.
//! State is process-local; use the Redis or memcache backends when several
//! instances must share one quota space.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{Backend, Hit};
use crate::error::Result;

/// How often the sweep thread scans for expired keys by default.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

struct Entry {
    count: u64,
    expires_at: Instant,
}

/// Counter backend storing state in a process-local map.
pub struct MemoryBackend {
    state: Arc<Mutex<HashMap<String, Entry>>>,
    // Dropping the sender stops the sweep thread.
    _sweep_quit: mpsc::Sender<()>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend::new(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryBackend {
    /// Create a backend whose sweep thread runs every `sweep_interval`.
    ///
    /// Correctness does not depend on sweep timing: `hit` treats an
    /// expired-but-unswept entry as absent. The sweep only bounds memory.
    pub fn new(sweep_interval: Duration) -> MemoryBackend {
        let state: Arc<Mutex<HashMap<String, Entry>>> = Arc::new(Mutex::new(HashMap::new()));
        let (quit_tx, quit_rx) = mpsc::channel();
        let sweep_state = Arc::clone(&state);
        thread::spawn(move || loop {
            match quit_rx.recv_timeout(sweep_interval) {
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    let now = Instant::now();
                    sweep_state.lock().retain(|_, e| e.expires_at > now);
                }
                _ => return,
            }
        });
        MemoryBackend {
            state,
            _sweep_quit: quit_tx,
        }
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.state.lock().values().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Backend for MemoryBackend {
    fn hit(&self, key: &str, ttl_secs: u32) -> Result<Hit> {
        let now = Instant::now();
        let mut state = self.state.lock();
        match state.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.count += 1;
                let remaining_ttl = (entry.expires_at - now).as_secs() as u32;
                Ok(Hit {
                    count: entry.count,
                    remaining_ttl,
                })
            }
            _ => {
                state.insert(
                    key.to_string(),
                    Entry {
                        count: 1,
                        expires_at: now + Duration::from_secs(u64::from(ttl_secs)),
                    },
                );
                Ok(Hit {
                    count: 1,
                    remaining_ttl: ttl_secs,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_hit_initializes() {
        let backend = MemoryBackend::default();
        let hit = backend.hit("k", 60).unwrap();
        assert_eq!(hit, Hit { count: 1, remaining_ttl: 60 });
    }

    #[test]
    fn test_hits_increment_within_window() {
        let backend = MemoryBackend::default();
        backend.hit("k", 60).unwrap();
        let hit = backend.hit("k", 60).unwrap();
        assert_eq!(hit.count, 2);
        assert!(hit.remaining_ttl <= 60);
    }

    #[test]
    fn test_key_isolation() {
        let backend = MemoryBackend::default();
        backend.hit("a", 60).unwrap();
        backend.hit("a", 60).unwrap();
        let hit = backend.hit("b", 60).unwrap();
        assert_eq!(hit.count, 1);
    }

    #[test]
    fn test_window_expires_and_restarts() {
        let backend = MemoryBackend::default();
        backend.hit("k", 1).unwrap();
        backend.hit("k", 1).unwrap();
        thread::sleep(Duration::from_millis(1100));
        // Expired entry counts as absent even before the sweep runs.
        let hit = backend.hit("k", 1).unwrap();
        assert_eq!(hit.count, 1);
    }

    #[test]
    fn test_sweep_evicts_expired_keys() {
        let backend = MemoryBackend::new(Duration::from_millis(50));
        backend.hit("k", 1).unwrap();
        assert_eq!(backend.len(), 1);
        thread::sleep(Duration::from_millis(1200));
        assert!(backend.is_empty());
    }
}
