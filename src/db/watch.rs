//! Filesystem watch of the database file.
//!
//! The watch is registered on the directory containing the file so that
//! atomic rename-into-place (the promotion step, or an external updater)
//! is observed as a create event. Matching events trigger a debounced
//! reload-and-swap.

use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::Shared;
use crate::error::Result;

/// Settle time after the first event of a burst; editors and downloaders
/// commonly issue several writes per logical update.
const DEBOUNCE: Duration = Duration::from_secs(1);

/// How often the watch thread wakes up to check for shutdown.
const POLL: Duration = Duration::from_millis(250);

pub(super) fn spawn(shared: Arc<Shared>) -> Result<()> {
    let dir = shared.make_dir()?;
    let (tx, rx) = mpsc::channel();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    thread::spawn(move || watch_loop(&shared, watcher, &rx));
    Ok(())
}

fn watch_loop(
    shared: &Shared,
    _watcher: RecommendedWatcher,
    rx: &mpsc::Receiver<notify::Result<Event>>,
) {
    loop {
        if shared.is_closed() {
            return;
        }
        match rx.recv_timeout(POLL) {
            Ok(Ok(event)) => {
                if !is_relevant(&event, &shared.file) {
                    continue;
                }
                thread::sleep(DEBOUNCE);
                while rx.try_recv().is_ok() {}
                if shared.is_closed() {
                    return;
                }
                if let Err(e) = shared.open_file() {
                    log::warn!("reload of {:?} failed: {}", shared.file, e);
                }
            }
            Ok(Err(e)) => log::warn!("watch error on {:?}: {}", shared.file, e),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Only create/modify events for the exact database file are relevant;
/// temp downloads and `.bak` backups in the same directory are not.
fn is_relevant(event: &Event, file: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == file.file_name())
}
