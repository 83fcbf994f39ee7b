//! Scoped store of data parts received during a chat turn.

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use parley_core::StreamPart;

/// Accumulates stream parts and notifies observers on every change.
///
/// One store is scoped to one chat view; parts never leak between stores.
#[derive(Debug)]
pub struct DataStream {
    tx: watch::Sender<Vec<StreamPart>>,
}

impl Default for DataStream {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStream {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Vec::new());
        Self { tx }
    }

    pub fn push(&self, part: StreamPart) {
        self.tx.send_modify(|parts| parts.push(part));
    }

    pub fn clear(&self) {
        self.tx.send_if_modified(|parts| {
            let changed = !parts.is_empty();
            parts.clear();
            changed
        });
    }

    /// Current parts, in arrival order.
    pub fn snapshot(&self) -> Vec<StreamPart> {
        self.tx.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<StreamPart>> {
        self.tx.subscribe()
    }

    /// Snapshots as a stream, starting with the current one.
    pub fn updates(&self) -> WatchStream<Vec<StreamPart>> {
        WatchStream::new(self.tx.subscribe())
    }
}
