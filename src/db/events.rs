//! Lossy notification streams for database lifecycle events.
//!
//! Each stream is a bounded channel of capacity one with non-blocking
//! sends: if a consumer has not drained the previous event, the new one is
//! dropped. These streams are an advisory observability signal for logging
//! and metrics, not a guaranteed audit log.

use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use parking_lot::Mutex;

use crate::error::Error;

/// Consumer side of the store's event streams.
///
/// Single-consumer: [`crate::GeoDb::events`] hands these out exactly once.
/// All receivers disconnect when the store is closed.
pub struct DbEvents {
    /// A new database was loaded or reloaded. Carries the file path.
    pub opened: Receiver<PathBuf>,
    /// A background refresh attempt failed.
    pub failed: Receiver<Error>,
    /// Free-text progress messages ("starting update", ...).
    pub info: Receiver<String>,
    /// Fires once when the store is closed, then disconnects.
    pub closed: Receiver<()>,
}

struct Senders {
    opened: SyncSender<PathBuf>,
    failed: SyncSender<Error>,
    info: SyncSender<String>,
    closed: SyncSender<()>,
}

/// Producer side. Sends become no-ops after [`Notifier::close`].
pub(crate) struct Notifier {
    senders: Mutex<Option<Senders>>,
}

impl Notifier {
    pub(crate) fn new() -> (Notifier, DbEvents) {
        let (opened_tx, opened_rx) = sync_channel(1);
        let (failed_tx, failed_rx) = sync_channel(1);
        let (info_tx, info_rx) = sync_channel(1);
        let (closed_tx, closed_rx) = sync_channel(1);
        let notifier = Notifier {
            senders: Mutex::new(Some(Senders {
                opened: opened_tx,
                failed: failed_tx,
                info: info_tx,
                closed: closed_tx,
            })),
        };
        let events = DbEvents {
            opened: opened_rx,
            failed: failed_rx,
            info: info_rx,
            closed: closed_rx,
        };
        (notifier, events)
    }

    pub(crate) fn opened(&self, path: PathBuf) {
        if let Some(s) = self.senders.lock().as_ref() {
            let _ = s.opened.try_send(path);
        }
    }

    pub(crate) fn failed(&self, err: Error) {
        if let Some(s) = self.senders.lock().as_ref() {
            let _ = s.failed.try_send(err);
        }
    }

    pub(crate) fn info(&self, message: impl Into<String>) {
        if let Some(s) = self.senders.lock().as_ref() {
            let _ = s.info.try_send(message.into());
        }
    }

    /// Emits the terminal closed event and drops all senders, which
    /// disconnects every receiver. Safe to call more than once.
    pub(crate) fn close(&self) {
        if let Some(s) = self.senders.lock().take() {
            let _ = s.closed.try_send(());
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_buffer_drops_newest() {
        let (notifier, events) = Notifier::new();
        notifier.info("first");
        notifier.info("second"); // dropped, buffer holds "first"
        assert_eq!(events.info.recv().unwrap(), "first");
        assert!(events.info.try_recv().is_err());
    }

    #[test]
    fn test_close_fires_once_and_disconnects() {
        let (notifier, events) = Notifier::new();
        notifier.close();
        notifier.close();
        assert!(events.closed.recv().is_ok());
        // Sender is gone: the stream is disconnected, not just empty.
        assert!(events.closed.recv().is_err());
        assert!(events.opened.recv().is_err());
    }

    #[test]
    fn test_send_after_close_is_inert() {
        let (notifier, events) = Notifier::new();
        notifier.close();
        notifier.info("late");
        assert!(events.info.try_recv().is_err());
    }
}
