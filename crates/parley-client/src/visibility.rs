//! Optimistic chat visibility changes.
//!
//! The local value flips as soon as an update starts. The server call then
//! either confirms it or the local value is reverted.

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::warn;

use parley_core::{ChatId, Visibility};

use crate::error::ClientError;

/// Server side of a visibility change.
#[async_trait]
pub trait VisibilityApi: Send + Sync {
    async fn update_visibility(
        &self,
        chat_id: ChatId,
        visibility: Visibility,
    ) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePhase {
    Pending,
    Confirmed,
    Reverted { reason: String },
}

/// One optimistic update: `Pending -> Confirmed | Reverted`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityUpdate {
    pub chat_id: ChatId,
    pub previous: Visibility,
    pub requested: Visibility,
    pub phase: UpdatePhase,
}

impl VisibilityUpdate {
    pub fn begin(chat_id: ChatId, previous: Visibility, requested: Visibility) -> Self {
        Self {
            chat_id,
            previous,
            requested,
            phase: UpdatePhase::Pending,
        }
    }

    /// Settled updates ignore further transitions.
    pub fn confirm(&mut self) {
        if self.phase == UpdatePhase::Pending {
            self.phase = UpdatePhase::Confirmed;
        }
    }

    pub fn revert(&mut self, reason: impl Into<String>) {
        if self.phase == UpdatePhase::Pending {
            self.phase = UpdatePhase::Reverted {
                reason: reason.into(),
            };
        }
    }

    pub fn is_settled(&self) -> bool {
        self.phase != UpdatePhase::Pending
    }

    /// Value the UI should show in the current phase.
    pub fn effective(&self) -> Visibility {
        match self.phase {
            UpdatePhase::Pending | UpdatePhase::Confirmed => self.requested,
            UpdatePhase::Reverted { .. } => self.previous,
        }
    }
}

/// Locally observed visibility of one chat.
#[derive(Debug)]
pub struct ChatVisibility {
    chat_id: ChatId,
    tx: watch::Sender<Visibility>,
}

impl ChatVisibility {
    pub fn new(chat_id: ChatId, initial: Visibility) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { chat_id, tx }
    }

    pub fn current(&self) -> Visibility {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Visibility> {
        self.tx.subscribe()
    }

    /// Flip locally, then reconcile with the server.
    pub async fn update<A>(&self, api: &A, requested: Visibility) -> VisibilityUpdate
    where
        A: VisibilityApi + ?Sized,
    {
        let previous = self.tx.send_replace(requested);
        let mut update = VisibilityUpdate::begin(self.chat_id, previous, requested);

        match api.update_visibility(self.chat_id, requested).await {
            Ok(()) => update.confirm(),
            Err(e) => {
                warn!(chat_id = %self.chat_id, error = %e, "Visibility update failed, reverting");
                update.revert(e.to_string());
                self.tx.send_replace(update.effective());
            }
        }
        update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::{ChatError, Surface};
    use parking_lot::Mutex;

    struct FakeApi {
        fail: bool,
        calls: Mutex<Vec<Visibility>>,
        seen_during_call: Mutex<Option<Visibility>>,
        observer: watch::Receiver<Visibility>,
    }

    #[async_trait]
    impl VisibilityApi for FakeApi {
        async fn update_visibility(
            &self,
            _chat_id: ChatId,
            visibility: Visibility,
        ) -> Result<(), ClientError> {
            *self.seen_during_call.lock() = Some(*self.observer.borrow());
            self.calls.lock().push(visibility);
            if self.fail {
                Err(ChatError::offline(Surface::Chat, "unreachable").into())
            } else {
                Ok(())
            }
        }
    }

    fn fake(state: &ChatVisibility, fail: bool) -> FakeApi {
        FakeApi {
            fail,
            calls: Mutex::new(Vec::new()),
            seen_during_call: Mutex::new(None),
            observer: state.subscribe(),
        }
    }

    #[tokio::test]
    async fn test_update_is_applied_before_server_call() {
        let state = ChatVisibility::new(ChatId::generate(), Visibility::Private);
        let api = fake(&state, false);

        let update = state.update(&api, Visibility::Public).await;

        assert_eq!(*api.seen_during_call.lock(), Some(Visibility::Public));
        assert_eq!(update.phase, UpdatePhase::Confirmed);
        assert_eq!(state.current(), Visibility::Public);
        assert_eq!(*api.calls.lock(), vec![Visibility::Public]);
    }

    #[tokio::test]
    async fn test_failed_update_reverts() {
        let state = ChatVisibility::new(ChatId::generate(), Visibility::Private);
        let api = fake(&state, true);

        let update = state.update(&api, Visibility::Public).await;

        assert!(matches!(update.phase, UpdatePhase::Reverted { .. }));
        assert_eq!(update.effective(), Visibility::Private);
        assert_eq!(state.current(), Visibility::Private);
    }

    #[test]
    fn test_settled_updates_ignore_transitions() {
        let mut update =
            VisibilityUpdate::begin(ChatId::generate(), Visibility::Private, Visibility::Public);
        assert!(!update.is_settled());

        update.confirm();
        update.revert("late failure");
        assert_eq!(update.phase, UpdatePhase::Confirmed);
        assert_eq!(update.effective(), Visibility::Public);
    }
}
