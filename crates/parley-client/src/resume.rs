//! Re-attaching a chat view to an in-flight generation.
//!
//! A view that mounts after its last message was sent by the user may have
//! missed the reply. The coordinator asks the server for the chat's stream,
//! writes every part into the view's [`DataStream`], and replaces the
//! message list with `initial ++ [message]` whenever a complete message
//! arrives. A stream cut short by the server is resumed again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_core::{ChatId, Message, Role, StreamPart};

use crate::data_stream::DataStream;
use crate::error::ClientError;
use crate::sse::PartStream;

/// Attachments per mount, counting re-attaches after an interrupted stream.
const MAX_ATTACH_ATTEMPTS: usize = 3;

/// Source of resumed streams.
#[async_trait]
pub trait StreamResumer: Send + Sync {
    /// `None` when the server has nothing to resume.
    async fn resume(&self, chat_id: ChatId) -> Result<Option<PartStream>, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
    Idle,
    Resuming,
    Attached,
    Done,
}

pub struct ResumeCoordinator {
    chat_id: ChatId,
    auto_resume: bool,
    initial_messages: Vec<Message>,
    resumer: Arc<dyn StreamResumer>,
    data: Arc<DataStream>,
    state: watch::Sender<ResumeState>,
    messages: watch::Sender<Vec<Message>>,
    mounted: AtomicBool,
    cancel: CancellationToken,
}

impl ResumeCoordinator {
    pub fn new(
        chat_id: ChatId,
        initial_messages: Vec<Message>,
        auto_resume: bool,
        resumer: Arc<dyn StreamResumer>,
        data: Arc<DataStream>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(ResumeState::Idle);
        let (messages, _) = watch::channel(initial_messages.clone());
        Arc::new(Self {
            chat_id,
            auto_resume,
            initial_messages,
            resumer,
            data,
            state,
            messages,
            mounted: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn state(&self) -> ResumeState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ResumeState> {
        self.state.subscribe()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.borrow().clone()
    }

    pub fn subscribe_messages(&self) -> watch::Receiver<Vec<Message>> {
        self.messages.subscribe()
    }

    /// True when the view may be missing a reply.
    pub fn should_resume(&self) -> bool {
        self.auto_resume
            && self
                .initial_messages
                .last()
                .is_some_and(|message| message.role == Role::User)
    }

    /// Start resuming. Only the first call on a coordinator has any effect.
    pub fn mount(self: &Arc<Self>) {
        if self.mounted.swap(true, Ordering::SeqCst) {
            return;
        }
        if !self.should_resume() || self.cancel.is_cancelled() {
            self.state.send_replace(ResumeState::Done);
            return;
        }

        self.state.send_replace(ResumeState::Resuming);
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.run().await });
    }

    /// Stop any resumption. Safe to call repeatedly, mounted or not.
    pub fn unmount(&self) {
        self.cancel.cancel();
        if !self.mounted.swap(true, Ordering::SeqCst) {
            self.state.send_replace(ResumeState::Done);
        }
    }

    /// Wait until the coordinator reaches `Done`.
    pub async fn finished(&self) {
        let mut rx = self.state.subscribe();
        rx.wait_for(|state| *state == ResumeState::Done).await.ok();
    }

    async fn run(self: Arc<Self>) {
        for attempt in 1..=MAX_ATTACH_ATTEMPTS {
            let Some(parts) = self.attach().await else {
                break;
            };
            self.state.send_replace(ResumeState::Attached);
            info!(chat_id = %self.chat_id, attempt, "Resumed stream");

            if !self.follow(parts).await {
                break;
            }
            warn!(chat_id = %self.chat_id, attempt, "Resumed stream was cut short");
        }

        self.state.send_replace(ResumeState::Done);
    }

    async fn attach(&self) -> Option<PartStream> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = self.resumer.resume(self.chat_id) => match result {
                Ok(Some(parts)) => Some(parts),
                Ok(None) => {
                    debug!(chat_id = %self.chat_id, "Nothing to resume");
                    None
                }
                Err(e) => {
                    warn!(chat_id = %self.chat_id, error = %e, "Failed to resume stream");
                    None
                }
            },
        }
    }

    /// Feed parts into the stores. Returns true if the stream was interrupted.
    async fn follow(&self, mut parts: PartStream) -> bool {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                next = parts.next() => match next {
                    Some(Ok(part)) => self.receive(part),
                    Some(Err(ClientError::Interrupted)) => return true,
                    Some(Err(e)) => {
                        warn!(chat_id = %self.chat_id, error = %e, "Resumed stream failed");
                        return false;
                    }
                    None => return false,
                },
            }
        }
    }

    fn receive(&self, part: StreamPart) {
        if let Some(decoded) = part.appended_message() {
            match decoded {
                Ok(message) => {
                    let mut messages = self.initial_messages.clone();
                    messages.push(message);
                    self.messages.send_replace(messages);
                }
                Err(e) => warn!(chat_id = %self.chat_id, error = %e, "Bad appended message"),
            }
        }
        self.data.push(part);
    }
}

impl Drop for ResumeCoordinator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
