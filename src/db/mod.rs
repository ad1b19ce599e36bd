//! Self-updating, concurrently readable geolocation database store.
//!
//! [`GeoDb`] owns one decoded MaxMind database reader at a time. Readers
//! are immutable once built and are swapped atomically under a write lock;
//! lookups clone the current reader handle under a read lock and decode
//! outside of it, so a swap never tears an in-flight lookup.
//!
//! Two background tasks keep the data fresh:
//! - a refresh loop (URL-backed stores only) that probes the remote source,
//!   downloads changed payloads to a temp file, and promotes them atomically;
//! - a filesystem watch that reloads the database when the file is replaced
//!   externally, e.g. by a sidecar updater.
//!
//! Lifecycle events are published on four lossy, bounded-1 streams; see
//! [`DbEvents`].

use std::fs;
use std::io::Read;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use flate2::read::GzDecoder;
use md5::{Digest, Md5};
use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};

mod events;
mod update;
mod watch;

pub use events::DbEvents;

type Reader = maxminddb::Reader<Vec<u8>>;

/// IP geolocation database store.
///
/// Created from a local file with [`GeoDb::open`] or from a remote URL
/// with [`GeoDb::open_url`]. All methods take `&self`; the store is meant
/// to be shared across request-handling threads.
pub struct GeoDb {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    file: PathBuf,
    update_interval: Duration,
    max_retry_interval: Duration,
    inner: RwLock<Inner>,
    notify: events::Notifier,
    events: Mutex<Option<DbEvents>>,
    // Dropping the senders disconnects the refresh loop's sleep.
    quit: Mutex<Vec<mpsc::Sender<()>>>,
}

#[derive(Default)]
struct Inner {
    reader: Option<Arc<Reader>>,
    last_updated: Option<SystemTime>,
    checksum: Option<String>,
    closed: bool,
}

impl GeoDb {
    /// Open a store backed by a local database file.
    ///
    /// Fails if the file is missing or corrupt. The file is watched for
    /// external replacement; there is no background refresh.
    pub fn open(path: impl Into<PathBuf>) -> Result<GeoDb> {
        let db = GeoDb {
            shared: Shared::new(path.into(), Duration::ZERO, Duration::ZERO),
        };
        if let Err(e) = db.shared.open_file() {
            db.close();
            return Err(e);
        }
        if let Err(e) = watch::spawn(Arc::clone(&db.shared)) {
            db.close();
            return Err(e);
        }
        Ok(db)
    }

    /// Open a store backed by a remote URL, cached at `cache_file`.
    ///
    /// Never blocks on the network: an initial load from the cache file is
    /// attempted and may fail silently, in which case the store starts
    /// unavailable and lookups return [`Error::Unavailable`] until the
    /// first download completes. The refresh loop starts immediately and
    /// retries failures with exponential backoff capped at
    /// `max_retry_interval`.
    pub fn open_url(
        url: impl Into<String>,
        cache_file: impl Into<PathBuf>,
        update_interval: Duration,
        max_retry_interval: Duration,
    ) -> Result<GeoDb> {
        let db = GeoDb {
            shared: Shared::new(cache_file.into(), update_interval, max_retry_interval),
        };
        // Optional, might fail: the refresh loop will fetch a fresh copy.
        let _ = db.shared.open_file();
        let (quit_tx, quit_rx) = mpsc::channel();
        db.shared.quit.lock().push(quit_tx);
        update::spawn(Arc::clone(&db.shared), url.into(), quit_rx);
        if let Err(e) = watch::spawn(Arc::clone(&db.shared)) {
            db.close();
            return Err(e);
        }
        Ok(db)
    }

    /// Conventional cache location for URL-backed stores.
    pub fn default_cache_file() -> PathBuf {
        std::env::temp_dir().join("ipgeo").join("db.mmdb.gz")
    }

    /// Look up `addr` and decode its record into `T`.
    ///
    /// Returns [`Error::Unavailable`] while no database has been loaded.
    /// An address that is not in the database decodes to `T::default()`;
    /// gaps in coverage are not an error. Structural decode errors from
    /// the reader are returned verbatim.
    pub fn lookup<T>(&self, addr: IpAddr) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        let reader = match self.shared.inner.read().reader.as_ref() {
            Some(r) => Arc::clone(r),
            None => return Err(Error::Unavailable),
        };
        match reader.lookup::<T>(addr) {
            Ok(record) => Ok(record),
            Err(maxminddb::MaxMindDBError::AddressNotFoundError(_)) => Ok(T::default()),
            Err(e) => Err(Error::Database(e)),
        }
    }

    /// Modification time of the currently loaded database, or `None`
    /// before the first load. Non-decreasing for a given store.
    pub fn last_updated(&self) -> Option<SystemTime> {
        self.shared.inner.read().last_updated
    }

    /// True once a database has been loaded and the store is not closed.
    pub fn is_available(&self) -> bool {
        self.shared.inner.read().reader.is_some()
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &Path {
        &self.shared.file
    }

    /// Take the event streams. Returns `None` on every call after the
    /// first; the streams are single-consumer.
    pub fn events(&self) -> Option<DbEvents> {
        self.shared.events.lock().take()
    }

    /// Close the store: stop the refresh loop and file watch, release the
    /// current reader, and close all event streams. Idempotent and safe
    /// to call from multiple threads.
    pub fn close(&self) {
        self.shared.close();
    }
}

impl Drop for GeoDb {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn new(file: PathBuf, update_interval: Duration, max_retry_interval: Duration) -> Arc<Shared> {
        let (notify, events) = events::Notifier::new();
        Arc::new(Shared {
            file,
            update_interval,
            max_retry_interval,
            inner: RwLock::new(Inner::default()),
            notify,
            events: Mutex::new(Some(events)),
            quit: Mutex::new(Vec::new()),
        })
    }

    /// Decode the backing file into a fresh reader and swap it in.
    ///
    /// Decoding happens before any lock is taken, so a corrupt candidate
    /// never affects the live reader.
    fn open_file(&self) -> Result<()> {
        let raw = fs::read(&self.file)?;
        let checksum = hex_digest(&raw);
        let reader = new_reader(raw)?;
        let modtime = fs::metadata(&self.file)?.modified()?;
        self.set_reader(reader, modtime, checksum);
        Ok(())
    }

    /// Swap protocol: install the new reader under the write lock unless
    /// the store is already closed. The superseded reader is released once
    /// the last in-flight lookup drops its handle.
    fn set_reader(&self, reader: Reader, modtime: SystemTime, checksum: String) {
        let mut inner = self.inner.write();
        if inner.closed {
            return;
        }
        inner.reader = Some(Arc::new(reader));
        inner.last_updated = Some(modtime);
        inner.checksum = Some(checksum);
        self.notify.opened(self.file.clone());
        log::info!("database loaded: {:?}", self.file);
    }

    fn checksum(&self) -> Option<String> {
        self.inner.read().checksum.clone()
    }

    fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    fn close(&self) {
        {
            let mut inner = self.inner.write();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.reader = None;
        }
        self.quit.lock().clear();
        self.notify.close();
    }

    /// Directory containing the database file, created on demand.
    fn make_dir(&self) -> Result<PathBuf> {
        let dir = match self.file.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Build a reader from raw file contents, decompressing gzip payloads.
fn new_reader(raw: Vec<u8>) -> Result<Reader> {
    let data = if is_gzip(&raw) {
        let mut decoder = GzDecoder::new(&raw[..]);
        let mut data = Vec::new();
        decoder.read_to_end(&mut data)?;
        data
    } else {
        raw
    };
    Ok(maxminddb::Reader::from_source(data)?)
}

fn is_gzip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b
}

fn hex_digest(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_gzip() {
        assert!(is_gzip(&[0x1f, 0x8b, 0x08]));
        assert!(!is_gzip(&[0x00, 0x01, 0x02]));
        assert!(!is_gzip(&[0x1f]));
    }

    #[test]
    fn test_hex_digest_stable() {
        // md5("") is a fixed vector.
        assert_eq!(hex_digest(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(hex_digest(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(GeoDb::open(dir.path().join("missing.mmdb")).is_err());
    }

    #[test]
    fn test_open_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mmdb");
        fs::write(&path, b"definitely not a database").unwrap();
        assert!(GeoDb::open(&path).is_err());
    }

    #[test]
    fn test_default_cache_file_under_tmp() {
        let p = GeoDb::default_cache_file();
        assert!(p.starts_with(std::env::temp_dir()));
    }
}
