//! Background refresh of URL-backed stores.
//!
//! One dedicated thread per store: probe the remote source, download
//! changed payloads to a temp file, promote atomically, and swap the new
//! reader in. Failures are never fatal; they are reported on the `failed`
//! event stream and retried with exponential backoff.

use std::f64::consts::E;
use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::NamedTempFile;

use super::Shared;
use crate::error::{Error, Result};

/// Response header carrying the payload digest, preferred over
/// Content-Length for update detection when the server supplies it.
pub const DATABASE_DIGEST_HEADER: &str = "X-Database-MD5";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

pub(super) fn spawn(shared: Arc<Shared>, url: String, quit: mpsc::Receiver<()>) {
    thread::spawn(move || auto_update(&shared, &url, &quit));
}

fn auto_update(shared: &Shared, url: &str, quit: &mpsc::Receiver<()>) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match run_update(shared, url) {
            Ok(()) => backoff = shared.update_interval,
            Err(e) => {
                backoff = next_backoff(backoff, shared.max_retry_interval);
                shared.notify.failed(Error::UpdateRetry {
                    retry_in: backoff,
                    source: Box::new(e),
                });
            }
        }
        // The sleep is interrupted when close() drops the quit sender.
        match quit.recv_timeout(backoff) {
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            _ => return,
        }
    }
}

fn run_update(shared: &Shared, url: &str) -> Result<()> {
    shared.notify.info("starting update");
    if !needs_update(&shared.file, shared.checksum().as_deref(), url)? {
        return Ok(());
    }
    shared.notify.info("starting download");
    let tmpfile = download(shared, url)?;
    shared.notify.info("finished download");
    promote(&shared.file, tmpfile)?;
    shared.open_file()?;
    shared.notify.info("finished update");
    Ok(())
}

/// Decide whether a download is warranted.
///
/// A missing local file always needs one. Otherwise a HEAD probe compares
/// the server digest header against the loaded checksum when present, and
/// falls back to a content-length comparison.
fn needs_update(file: &Path, checksum: Option<&str>, url: &str) -> Result<bool> {
    let stat = match fs::metadata(file) {
        Ok(stat) => stat,
        Err(_) => return Ok(true),
    };
    let resp = ureq::head(url).call()?;
    if let Some(digest) = resp.header(DATABASE_DIGEST_HEADER) {
        return Ok(checksum != Some(digest));
    }
    match parse_content_length(&resp) {
        Some(len) => Ok(stat.len() != len),
        None => Ok(true),
    }
}

fn parse_content_length(resp: &ureq::Response) -> Option<u64> {
    resp.header("Content-Length")?.parse().ok()
}

/// Download the payload into a freshly named temp file next to the cache
/// file. The temp file is removed automatically if it is never promoted.
fn download(shared: &Shared, url: &str) -> Result<NamedTempFile> {
    let dir = shared.make_dir()?;
    let resp = ureq::get(url).call()?;
    if resp.status() != 200 {
        return Err(Error::HttpStatus(resp.status()));
    }
    let mut tmpfile = NamedTempFile::new_in(dir)?;
    std::io::copy(&mut resp.into_reader(), tmpfile.as_file_mut())?;
    tmpfile.as_file().sync_all()?;
    Ok(tmpfile)
}

/// Back up the previous database (best-effort) and atomically rename the
/// downloaded file into place.
fn promote(file: &Path, tmpfile: NamedTempFile) -> Result<()> {
    let mut bak = file.as_os_str().to_owned();
    bak.push(".bak");
    let _ = fs::rename(file, bak); // Optional, might fail.
    tmpfile.persist(file).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Grow the retry delay by a factor of e, capped at `max`.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    Duration::from_secs_f64((current.as_secs_f64() * E).min(max.as_secs_f64()))
}
