//! Persistence seams for chats, messages and documents.
//!
//! Services only talk to these traits. The in-memory implementation in
//! [`memory`] is what the server runs with today.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use parley_core::{
    Chat, ChatError, ChatId, Document, DocumentId, DocumentVersion, Message, MessageId, Surface,
    UserId, Visibility,
};

pub mod memory;

pub use memory::MemoryStore;

/// Sort key of a chat in a user's history: `(updated_at, id)`.
pub type ChatKey = (DateTime<Utc>, ChatId);

/// Repository errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Storage failures surface to clients as `offline:<surface>`.
    pub fn into_chat_error(self, surface: Surface) -> ChatError {
        ChatError::offline(surface, self.to_string())
    }
}

/// Document persistence.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, StoreError>;

    /// Insert a new document. Fails with `Conflict` if the id is taken.
    async fn create(&self, document: Document) -> Result<(), StoreError>;

    /// Append a version. Fails with `Conflict` if the document is missing or
    /// the version does not sort strictly after the current one.
    async fn append_version(
        &self,
        id: &DocumentId,
        version: DocumentVersion,
    ) -> Result<(), StoreError>;

    /// Delete every version created strictly after `cutoff`. Returns how many were removed.
    async fn delete_versions_after(
        &self,
        id: &DocumentId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

/// Chat and message persistence.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn get_chat(&self, id: &ChatId) -> Result<Option<Chat>, StoreError>;

    async fn insert_chat(&self, chat: Chat) -> Result<(), StoreError>;

    /// Move `updated_at` forward to `at` and re-index the chat. An older `at`
    /// leaves the chat unchanged. Returns the stored chat, `None` if missing.
    async fn touch_chat(&self, id: &ChatId, at: DateTime<Utc>) -> Result<Option<Chat>, StoreError>;

    /// Set the visibility of a stored chat. Returns the stored chat, `None` if missing.
    async fn set_visibility(
        &self,
        id: &ChatId,
        visibility: Visibility,
    ) -> Result<Option<Chat>, StoreError>;

    /// Delete a chat and its messages.
    async fn delete_chat(&self, id: &ChatId) -> Result<Option<Chat>, StoreError>;

    /// Delete all chats of an owner. Returns the deleted ids.
    async fn delete_chats_by_owner(&self, owner: &UserId) -> Result<Vec<ChatId>, StoreError>;

    /// Up to `limit` chats of `owner` sorting strictly before `before`
    /// (or from the newest when `None`), newest first.
    async fn chats_older_than(
        &self,
        owner: &UserId,
        before: Option<ChatKey>,
        limit: usize,
    ) -> Result<Vec<Chat>, StoreError>;

    /// Up to `limit` chats of `owner` sorting strictly after `after`,
    /// nearest to the boundary first.
    async fn chats_newer_than(
        &self,
        owner: &UserId,
        after: ChatKey,
        limit: usize,
    ) -> Result<Vec<Chat>, StoreError>;

    async fn insert_message(&self, message: Message) -> Result<(), StoreError>;

    /// Messages of a chat in creation order.
    async fn messages(&self, chat_id: &ChatId) -> Result<Vec<Message>, StoreError>;

    async fn get_message(&self, id: &MessageId) -> Result<Option<Message>, StoreError>;

    /// Delete every message of the chat created at or after `at`.
    async fn delete_messages_from(
        &self,
        chat_id: &ChatId,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Number of user-authored messages across the owner's chats since `since`.
    async fn count_user_messages_since(
        &self,
        owner: &UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError>;

    async fn count_chats(&self) -> Result<usize, StoreError>;
}
