//! Stream part channels for in-flight generations.
//!
//! Each generation session is a single-producer broadcast channel keyed by
//! `(chat_id, generation_id)`. Consumers subscribe and receive every part
//! published after they attached. Closed sessions leave a tombstone for the
//! retention window so late resumers learn the stream is over instead of
//! getting "not found".

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use parley_core::{ChatId, GenerationId, StreamPart};

/// Identifies one generation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub chat_id: ChatId,
    pub generation_id: GenerationId,
}

/// Result of attaching to a session.
#[derive(Debug)]
pub enum Attachment {
    /// Session is open; parts published from now on arrive on the receiver.
    Live(broadcast::Receiver<StreamPart>),
    /// Session has finished.
    Closed,
}

#[derive(Debug)]
struct SessionEntry {
    /// `None` once the session is closed.
    sender: Option<broadcast::Sender<StreamPart>>,
    closed_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<SessionKey, SessionEntry>,
    latest: HashMap<ChatId, GenerationId>,
}

/// Registry of generation sessions.
#[derive(Debug)]
pub struct StreamRegistry {
    inner: RwLock<Inner>,
    buffer: usize,
    retention: Duration,
}

impl StreamRegistry {
    pub fn new(buffer: usize, retention: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            buffer: buffer.max(1),
            retention,
        }
    }

    /// Open a new session for `chat_id`. It becomes the chat's latest session.
    pub fn open(self: &Arc<Self>, chat_id: ChatId) -> StreamPublisher {
        let key = SessionKey {
            chat_id,
            generation_id: GenerationId::generate(),
        };
        let (sender, _) = broadcast::channel(self.buffer);

        let mut inner = self.inner.write();
        inner.sessions.insert(
            key,
            SessionEntry {
                sender: Some(sender.clone()),
                closed_at: None,
            },
        );
        inner.latest.insert(chat_id, key.generation_id);
        debug!(chat_id = %chat_id, generation_id = %key.generation_id, "Stream session opened");

        StreamPublisher {
            registry: Arc::clone(self),
            key,
            sender: Some(sender),
        }
    }

    /// Attach to a session. `None` if it is unknown (or already collected).
    pub fn attach(&self, key: &SessionKey) -> Option<Attachment> {
        let inner = self.inner.read();
        let entry = inner.sessions.get(key)?;
        Some(match &entry.sender {
            Some(sender) => Attachment::Live(sender.subscribe()),
            None => Attachment::Closed,
        })
    }

    /// Latest session opened for a chat, if still known.
    pub fn latest_session(&self, chat_id: &ChatId) -> Option<SessionKey> {
        let inner = self.inner.read();
        inner.latest.get(chat_id).map(|generation_id| SessionKey {
            chat_id: *chat_id,
            generation_id: *generation_id,
        })
    }

    /// Attach to the latest session of a chat.
    pub fn attach_latest(&self, chat_id: &ChatId) -> Option<Attachment> {
        let key = self.latest_session(chat_id)?;
        self.attach(&key)
    }

    fn close(&self, key: &SessionKey) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner.sessions.get_mut(key) {
            if entry.sender.take().is_some() {
                entry.closed_at = Some(Instant::now());
                debug!(chat_id = %key.chat_id, generation_id = %key.generation_id, "Stream session closed");
            }
        }
    }

    /// Drop tombstones older than the retention window. Returns how many were removed.
    pub fn gc(&self) -> usize {
        self.gc_at(Instant::now())
    }

    fn gc_at(&self, now: Instant) -> usize {
        let mut inner = self.inner.write();
        let retention = self.retention;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, entry| match entry.closed_at {
            Some(closed_at) => now.saturating_duration_since(closed_at) < retention,
            None => true,
        });
        let Inner { sessions, latest } = &mut *inner;
        latest.retain(|chat_id, generation_id| {
            sessions.contains_key(&SessionKey {
                chat_id: *chat_id,
                generation_id: *generation_id,
            })
        });
        before - inner.sessions.len()
    }

    /// Forget every session of a chat.
    pub fn purge_chat(&self, chat_id: &ChatId) {
        let mut inner = self.inner.write();
        inner.sessions.retain(|key, _| key.chat_id != *chat_id);
        inner.latest.remove(chat_id);
    }

    pub fn open_count(&self) -> usize {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|e| e.sender.is_some())
            .count()
    }

    pub fn closed_count(&self) -> usize {
        self.inner
            .read()
            .sessions
            .values()
            .filter(|e| e.sender.is_none())
            .count()
    }
}

/// Producer handle for one session. Dropping it closes the session.
#[derive(Debug)]
pub struct StreamPublisher {
    registry: Arc<StreamRegistry>,
    key: SessionKey,
    sender: Option<broadcast::Sender<StreamPart>>,
}

impl StreamPublisher {
    pub fn key(&self) -> SessionKey {
        self.key
    }

    /// Deliver a part to every attached consumer. Returns how many received it.
    pub fn publish(&self, part: StreamPart) -> usize {
        match &self.sender {
            // no consumers is not an error, the part is simply dropped
            Some(sender) => sender.send(part).unwrap_or(0),
            None => {
                warn!(chat_id = %self.key.chat_id, "Publish on closed stream session");
                0
            }
        }
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<StreamPart>> {
        self.sender.as_ref().map(|s| s.subscribe())
    }

    /// Mark the session terminal. Consumers drain buffered parts and then end.
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.sender.take().is_some() {
            self.registry.close(&self.key);
        }
    }
}

impl Drop for StreamPublisher {
    fn drop(&mut self) {
        self.finish();
    }
}
