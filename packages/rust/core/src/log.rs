//! Ordered progress log for discovery runs.
//!
//! Producers append; consumers either take a [`LogStream::snapshot`] or
//! [`LogStream::subscribe`] to a broadcast channel. Both observe entries in
//! append order: the buffer push and the broadcast send happen under the
//! same lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use grantscout_shared::{LogEntry, LogLevel};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Buffered entries per subscriber before a slow consumer starts lagging.
const CHANNEL_CAPACITY: usize = 256;

/// Append-only, timestamped progress log shared by every run phase.
///
/// Cheap to clone; clones share the same buffer and channel.
#[derive(Debug, Clone)]
pub struct LogStream {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    entries: Mutex<Vec<LogEntry>>,
    tx: broadcast::Sender<LogEntry>,
}

impl Default for LogStream {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStream {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(Vec::new()),
                tx,
            }),
        }
    }

    /// Append a new entry and publish it to subscribers.
    pub fn append(&self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(level, message);

        let mut entries = self.lock();
        mirror_to_tracing(&entry);
        entries.push(entry.clone());
        // No subscribers is fine; the buffer still holds the entry.
        let _ = self.inner.tx.send(entry.clone());

        entry
    }

    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Info, message)
    }

    pub fn success(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Success, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogLevel::Error, message)
    }

    /// All retained entries, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    /// Drop all retained entries. Called by the host before a new run.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Receive every entry appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.inner.tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn mirror_to_tracing(entry: &LogEntry) {
    match entry.level {
        LogLevel::Info | LogLevel::Success => {
            info!(kind = %entry.level, "{}", entry.message)
        }
        LogLevel::Warning => warn!("{}", entry.message),
        LogLevel::Error => error!("{}", entry.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_preserves_append_order() {
        let log = LogStream::new();
        log.info("first");
        log.success("second");
        log.warning("third");
        log.error("fourth");

        let entries = log.snapshot();
        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third", "fourth"]);
        assert_eq!(entries[3].level, LogLevel::Error);
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn clear_empties_buffer_but_keeps_stream_usable() {
        let log = LogStream::new();
        log.info("old run");
        log.clear();
        assert!(log.is_empty());

        log.info("new run");
        assert_eq!(log.len(), 1);
        assert_eq!(log.snapshot()[0].message, "new run");
    }

    #[test]
    fn clones_share_the_buffer() {
        let log = LogStream::new();
        let producer = log.clone();
        producer.info("from clone");
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn subscribers_receive_entries_in_order() {
        let log = LogStream::new();
        let mut rx = log.subscribe();

        let a = log.info("a");
        let b = log.error("b");

        assert_eq!(rx.recv().await.unwrap(), a);
        assert_eq!(rx.recv().await.unwrap(), b);
    }

    #[tokio::test]
    async fn late_subscriber_only_sees_new_entries() {
        let log = LogStream::new();
        log.info("before");
        let mut rx = log.subscribe();
        log.info("after");

        assert_eq!(rx.recv().await.unwrap().message, "after");
        assert!(rx.try_recv().is_err());
    }
}
