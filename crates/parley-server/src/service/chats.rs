//! Chat lifecycle: turns, messages, visibility and deletion.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use parley_core::chat::title_from_message;
use parley_core::{
    authorize, Chat, ChatError, ChatId, ChatPayload, ChatRequest, EntitlementTable, Message,
    MessageId, ResourceOwner, Right, Role, Surface, UserId, Visibility,
};

use crate::auth::Session;
use crate::repo::ChatRepository;
use crate::stream::{StreamPublisher, StreamRegistry};

const UNTITLED: &str = "New chat";

fn owner_of(chat: &Chat) -> ResourceOwner {
    ResourceOwner {
        owner_id: chat.owner_id,
        visibility: chat.visibility,
    }
}

/// An admitted turn. The reply is published through `publisher`.
#[derive(Debug)]
pub struct Turn {
    pub chat: Chat,
    pub publisher: StreamPublisher,
}

/// Chat service.
pub struct ChatService {
    chats: Arc<dyn ChatRepository>,
    streams: Arc<StreamRegistry>,
    entitlements: EntitlementTable,
}

impl ChatService {
    pub fn new(
        chats: Arc<dyn ChatRepository>,
        streams: Arc<StreamRegistry>,
        entitlements: EntitlementTable,
    ) -> Self {
        Self {
            chats,
            streams,
            entitlements,
        }
    }

    async fn load(&self, id: &ChatId) -> Result<Option<Chat>, ChatError> {
        self.chats
            .get_chat(id)
            .await
            .map_err(|e| e.into_chat_error(Surface::Chat))
    }

    /// Load a chat and check `right` for the caller.
    pub async fn authorized_chat(
        &self,
        id: &ChatId,
        caller: Option<&UserId>,
        right: Right,
    ) -> Result<Chat, ChatError> {
        let chat = self.load(id).await?;
        authorize(chat.as_ref().map(owner_of).as_ref(), caller, right)
            .map_err(|d| d.into_error(Surface::Chat))?;
        chat.ok_or_else(|| ChatError::not_found(Surface::Chat))
    }

    /// Messages of a chat, readable by its owner or by anyone if public.
    pub async fn messages(
        &self,
        id: &ChatId,
        caller: Option<&UserId>,
    ) -> Result<Vec<Message>, ChatError> {
        self.authorized_chat(id, caller, Right::Read).await?;
        self.chats
            .messages(id)
            .await
            .map_err(|e| e.into_chat_error(Surface::Chat))
    }

    pub async fn set_visibility(
        &self,
        id: &ChatId,
        caller: Option<&UserId>,
        visibility: Visibility,
    ) -> Result<Chat, ChatError> {
        self.authorized_chat(id, caller, Right::Write).await?;
        let chat = self
            .chats
            .set_visibility(id, visibility)
            .await
            .map_err(|e| e.into_chat_error(Surface::Chat))?
            .ok_or_else(|| ChatError::not_found(Surface::Chat))?;
        info!(chat_id = %id, visibility = ?visibility, "Chat visibility changed");
        Ok(chat)
    }

    pub async fn delete_chat(
        &self,
        id: &ChatId,
        caller: Option<&UserId>,
    ) -> Result<Chat, ChatError> {
        self.authorized_chat(id, caller, Right::Write).await?;
        let deleted = self
            .chats
            .delete_chat(id)
            .await
            .map_err(|e| e.into_chat_error(Surface::Chat))?
            .ok_or_else(|| ChatError::not_found(Surface::Chat))?;
        self.streams.purge_chat(id);
        info!(chat_id = %id, "Chat deleted");
        Ok(deleted)
    }

    /// Delete a message and every later message of its chat (edit/retry).
    pub async fn delete_trailing(
        &self,
        message_id: &MessageId,
        caller: Option<&UserId>,
    ) -> Result<usize, ChatError> {
        let caller = caller.ok_or_else(|| ChatError::unauthorized(Surface::Chat))?;
        let message = self
            .chats
            .get_message(message_id)
            .await
            .map_err(|e| e.into_chat_error(Surface::Chat))?
            .ok_or_else(|| ChatError::not_found(Surface::Chat))?;
        self.authorized_chat(&message.chat_id, Some(caller), Right::Write)
            .await?;

        let removed = self
            .chats
            .delete_messages_from(&message.chat_id, message.created_at)
            .await
            .map_err(|e| e.into_chat_error(Surface::Chat))?;
        debug!(chat_id = %message.chat_id, removed, "Trailing messages deleted");
        Ok(removed)
    }

    /// Admit a chat turn: quota, chat creation or ownership, user message.
    ///
    /// The stream session is registered before the user message is stored, so
    /// a resume that sees the trailing user message always finds the session.
    pub async fn begin_turn(
        &self,
        session: &Session,
        request: &ChatRequest,
    ) -> Result<Turn, ChatError> {
        let now = Utc::now();
        let sent = self
            .chats
            .count_user_messages_since(&session.user_id, now - Duration::hours(24))
            .await
            .map_err(|e| e.into_chat_error(Surface::Chat))?;
        self.entitlements.ensure_quota(session.user_type, sent)?;

        let user_message = match &request.payload {
            ChatPayload::NewMessage(m) => Some(Message {
                id: m.id,
                chat_id: request.chat_id,
                role: Role::User,
                parts: m.parts.clone(),
                created_at: now,
            }),
            ChatPayload::ReplayMessages(_) => None,
        };

        let mut chat = match self.load(&request.chat_id).await? {
            Some(chat) => {
                authorize(Some(&owner_of(&chat)), Some(&session.user_id), Right::Write)
                    .map_err(|d| d.into_error(Surface::Chat))?;
                chat
            }
            None => {
                let title = user_message
                    .as_ref()
                    .map(title_from_message)
                    .unwrap_or_else(|| UNTITLED.to_string());
                let chat = Chat::new(request.chat_id, session.user_id, title, request.visibility);
                self.chats
                    .insert_chat(chat.clone())
                    .await
                    .map_err(|e| e.into_chat_error(Surface::Chat))?;
                info!(chat_id = %chat.id, user_id = %session.user_id, "Chat created");
                chat
            }
        };

        let publisher = self.streams.open(chat.id);

        if let Some(message) = user_message {
            self.chats
                .insert_message(message)
                .await
                .map_err(|e| e.into_chat_error(Surface::Chat))?;
            if let Some(touched) = self
                .chats
                .touch_chat(&chat.id, now)
                .await
                .map_err(|e| e.into_chat_error(Surface::Chat))?
            {
                chat = touched;
            }
        }

        Ok(Turn { chat, publisher })
    }

    /// Persist the assistant's reply for a finished turn.
    pub async fn finish_turn(&self, chat_id: &ChatId, text: &str) -> Result<Message, ChatError> {
        let message = Message::assistant(*chat_id, text);
        self.chats
            .insert_message(message.clone())
            .await
            .map_err(|e| e.into_chat_error(Surface::Chat))?;
        self.chats
            .touch_chat(chat_id, message.created_at)
            .await
            .map_err(|e| e.into_chat_error(Surface::Chat))?;
        Ok(message)
    }

    /// Last persisted message of a chat.
    pub async fn last_message(&self, chat_id: &ChatId) -> Result<Option<Message>, ChatError> {
        let messages = self
            .chats
            .messages(chat_id)
            .await
            .map_err(|e| e.into_chat_error(Surface::Stream))?;
        Ok(messages.into_iter().last())
    }
}
