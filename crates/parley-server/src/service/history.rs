//! Cursor-based windowing over a user's chat history.

use std::sync::Arc;

use tracing::{debug, info};

use parley_core::{ChatError, ChatId, HistoryPage, PageCursor, PageRequest, Surface, UserId};

use crate::repo::{ChatKey, ChatRepository};
use crate::stream::StreamRegistry;

/// History paginator.
pub struct HistoryPaginator {
    chats: Arc<dyn ChatRepository>,
    streams: Arc<StreamRegistry>,
    max_page_size: usize,
}

impl HistoryPaginator {
    pub fn new(
        chats: Arc<dyn ChatRepository>,
        streams: Arc<StreamRegistry>,
        max_page_size: usize,
    ) -> Self {
        Self {
            chats,
            streams,
            max_page_size,
        }
    }

    /// One page of the caller's chats, most recently updated first.
    pub async fn page(
        &self,
        caller: Option<&UserId>,
        limit: Option<usize>,
        starting_after: Option<ChatId>,
        ending_before: Option<ChatId>,
    ) -> Result<HistoryPage, ChatError> {
        let request = PageRequest::new(limit, starting_after, ending_before, self.max_page_size)?;
        let owner = caller.ok_or_else(|| ChatError::unauthorized(Surface::History))?;

        let fetch = request.limit + 1;
        let (mut chats, reverse) = match request.cursor {
            PageCursor::Latest => (self.older_than(owner, None, fetch).await?, false),
            PageCursor::StartingAfter(id) => {
                let key = self.resolve_cursor(owner, &id).await?;
                (self.older_than(owner, Some(key), fetch).await?, false)
            }
            PageCursor::EndingBefore(id) => {
                let key = self.resolve_cursor(owner, &id).await?;
                let chats = self
                    .chats
                    .chats_newer_than(owner, key, fetch)
                    .await
                    .map_err(|e| e.into_chat_error(Surface::History))?;
                (chats, true)
            }
        };

        let has_more = chats.len() > request.limit;
        chats.truncate(request.limit);
        if reverse {
            chats.reverse();
        }

        debug!(user_id = %owner, returned = chats.len(), has_more, "History page");
        Ok(HistoryPage { chats, has_more })
    }

    async fn older_than(
        &self,
        owner: &UserId,
        before: Option<ChatKey>,
        limit: usize,
    ) -> Result<Vec<parley_core::Chat>, ChatError> {
        self.chats
            .chats_older_than(owner, before, limit)
            .await
            .map_err(|e| e.into_chat_error(Surface::History))
    }

    /// The cursor must name one of the caller's chats.
    async fn resolve_cursor(&self, owner: &UserId, id: &ChatId) -> Result<ChatKey, ChatError> {
        let chat = self
            .chats
            .get_chat(id)
            .await
            .map_err(|e| e.into_chat_error(Surface::History))?;
        match chat {
            Some(chat) if chat.owner_id == *owner => Ok(chat.sort_key()),
            _ => Err(ChatError::not_found(Surface::History)
                .with_cause(format!("Chat with id {} not found", id))),
        }
    }

    /// Delete every chat of the caller with its messages and stream sessions.
    pub async fn delete_all(&self, caller: Option<&UserId>) -> Result<usize, ChatError> {
        let owner = caller.ok_or_else(|| ChatError::unauthorized(Surface::History))?;
        let deleted = self
            .chats
            .delete_chats_by_owner(owner)
            .await
            .map_err(|e| e.into_chat_error(Surface::History))?;
        for chat_id in &deleted {
            self.streams.purge_chat(chat_id);
        }
        info!(user_id = %owner, deleted = deleted.len(), "History deleted");
        Ok(deleted.len())
    }
}
