//! Cursor-based pagination types for a user's chat history.

use serde::{Deserialize, Serialize};

use crate::chat::Chat;
use crate::error::{ChatError, Surface};
use crate::ids::ChatId;

/// Page size used when the client does not ask for one.
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// Where a page starts relative to a boundary chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    /// Most recently active chats.
    Latest,
    /// Chats immediately older than the boundary chat.
    StartingAfter(ChatId),
    /// Chats immediately newer than the boundary chat.
    EndingBefore(ChatId),
}

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub cursor: PageCursor,
}

impl PageRequest {
    /// Build a page request, clamping `limit` to `1..=max_limit`.
    ///
    /// Supplying both cursors is a `bad_request`.
    pub fn new(
        limit: Option<usize>,
        starting_after: Option<ChatId>,
        ending_before: Option<ChatId>,
        max_limit: usize,
    ) -> Result<Self, ChatError> {
        let cursor = match (starting_after, ending_before) {
            (Some(_), Some(_)) => {
                return Err(ChatError::bad_request(
                    Surface::Api,
                    "Only one of starting_after or ending_before can be provided.",
                ))
            }
            (Some(id), None) => PageCursor::StartingAfter(id),
            (None, Some(id)) => PageCursor::EndingBefore(id),
            (None, None) => PageCursor::Latest,
        };
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, max_limit.max(1));
        Ok(Self { limit, cursor })
    }
}

/// One page of chats, most recently active first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub chats: Vec<Chat>,
    pub has_more: bool,
}

impl HistoryPage {
    /// Cursor for the next older page, if any chats were returned.
    pub fn last_cursor(&self) -> Option<ChatId> {
        self.chats.last().map(|c| c.id)
    }

    /// Cursor for the next newer page, if any chats were returned.
    pub fn first_cursor(&self) -> Option<ChatId> {
        self.chats.first().map(|c| c.id)
    }
}
