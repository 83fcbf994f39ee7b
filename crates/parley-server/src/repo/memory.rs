//! In-memory repository backed by `tokio::sync::RwLock` maps.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use parley_core::{
    Chat, ChatId, Document, DocumentId, DocumentVersion, Message, MessageId, Role, UserId,
    Visibility,
};

use super::{ChatKey, ChatRepository, DocumentRepository, StoreError};

struct ChatRecord {
    chat: Chat,
    messages: Vec<Message>,
}

#[derive(Default)]
struct Inner {
    documents: HashMap<DocumentId, Document>,
    chats: HashMap<ChatId, ChatRecord>,
    /// Per-owner history index ordered by `(updated_at, id)`.
    by_owner: HashMap<UserId, BTreeSet<ChatKey>>,
    /// Message id -> owning chat.
    message_chat: HashMap<MessageId, ChatId>,
}

impl Inner {
    fn unindex(&mut self, chat: &Chat) {
        if let Some(index) = self.by_owner.get_mut(&chat.owner_id) {
            index.remove(&chat.sort_key());
            if index.is_empty() {
                self.by_owner.remove(&chat.owner_id);
            }
        }
    }

    fn remove_chat(&mut self, id: &ChatId) -> Option<Chat> {
        let record = self.chats.remove(id)?;
        self.unindex(&record.chat);
        for message in &record.messages {
            self.message_chat.remove(&message.id);
        }
        Some(record.chat)
    }

    fn chat_from_key(&self, key: &ChatKey) -> Option<Chat> {
        self.chats.get(&key.1).map(|r| r.chat.clone())
    }
}

/// In-memory store implementing every repository trait.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn get(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.inner.read().await.documents.get(id).cloned())
    }

    async fn create(&self, document: Document) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.documents.contains_key(&document.id) {
            return Err(StoreError::Conflict(format!(
                "document {} already exists",
                document.id
            )));
        }
        inner.documents.insert(document.id.clone(), document);
        Ok(())
    }

    async fn append_version(
        &self,
        id: &DocumentId,
        version: DocumentVersion,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let document = inner
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::Conflict(format!("document {} does not exist", id)))?;
        if !document.push_version(version) {
            return Err(StoreError::Conflict(format!(
                "version of document {} is not newer than the current one",
                id
            )));
        }
        Ok(())
    }

    async fn delete_versions_after(
        &self,
        id: &DocumentId,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .documents
            .get_mut(id)
            .map(|d| d.truncate_after(cutoff))
            .unwrap_or(0))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.documents.len())
    }
}

#[async_trait]
impl ChatRepository for MemoryStore {
    async fn get_chat(&self, id: &ChatId) -> Result<Option<Chat>, StoreError> {
        Ok(self.inner.read().await.chats.get(id).map(|r| r.chat.clone()))
    }

    async fn insert_chat(&self, chat: Chat) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.chats.contains_key(&chat.id) {
            return Err(StoreError::Conflict(format!("chat {} already exists", chat.id)));
        }
        inner
            .by_owner
            .entry(chat.owner_id)
            .or_default()
            .insert(chat.sort_key());
        inner.chats.insert(
            chat.id,
            ChatRecord {
                chat,
                messages: Vec::new(),
            },
        );
        Ok(())
    }

    async fn touch_chat(&self, id: &ChatId, at: DateTime<Utc>) -> Result<Option<Chat>, StoreError> {
        let mut inner = self.inner.write().await;
        let previous = match inner.chats.get(id) {
            Some(record) => record.chat.clone(),
            None => return Ok(None),
        };
        if at <= previous.updated_at {
            return Ok(Some(previous));
        }

        inner.unindex(&previous);
        let mut chat = previous;
        chat.updated_at = at;
        inner
            .by_owner
            .entry(chat.owner_id)
            .or_default()
            .insert(chat.sort_key());
        if let Some(record) = inner.chats.get_mut(id) {
            record.chat = chat.clone();
        }
        Ok(Some(chat))
    }

    async fn set_visibility(
        &self,
        id: &ChatId,
        visibility: Visibility,
    ) -> Result<Option<Chat>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.chats.get_mut(id).map(|record| {
            record.chat.visibility = visibility;
            record.chat.clone()
        }))
    }

    async fn delete_chat(&self, id: &ChatId) -> Result<Option<Chat>, StoreError> {
        Ok(self.inner.write().await.remove_chat(id))
    }

    async fn delete_chats_by_owner(&self, owner: &UserId) -> Result<Vec<ChatId>, StoreError> {
        let mut inner = self.inner.write().await;
        let ids: Vec<ChatId> = inner
            .by_owner
            .get(owner)
            .map(|index| index.iter().map(|(_, id)| *id).collect())
            .unwrap_or_default();
        for id in &ids {
            inner.remove_chat(id);
        }
        Ok(ids)
    }

    async fn chats_older_than(
        &self,
        owner: &UserId,
        before: Option<ChatKey>,
        limit: usize,
    ) -> Result<Vec<Chat>, StoreError> {
        let inner = self.inner.read().await;
        let Some(index) = inner.by_owner.get(owner) else {
            return Ok(Vec::new());
        };
        let upper = match before {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        Ok(index
            .range((Bound::Unbounded, upper))
            .rev()
            .take(limit)
            .filter_map(|key| inner.chat_from_key(key))
            .collect())
    }

    async fn chats_newer_than(
        &self,
        owner: &UserId,
        after: ChatKey,
        limit: usize,
    ) -> Result<Vec<Chat>, StoreError> {
        let inner = self.inner.read().await;
        let Some(index) = inner.by_owner.get(owner) else {
            return Ok(Vec::new());
        };
        Ok(index
            .range((Bound::Excluded(after), Bound::Unbounded))
            .take(limit)
            .filter_map(|key| inner.chat_from_key(key))
            .collect())
    }

    async fn insert_message(&self, message: Message) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.message_chat.contains_key(&message.id) {
            return Err(StoreError::Conflict(format!(
                "message {} already exists",
                message.id
            )));
        }
        let chat_id = message.chat_id;
        let message_id = message.id;
        let record = inner
            .chats
            .get_mut(&chat_id)
            .ok_or_else(|| StoreError::Conflict(format!("chat {} does not exist", chat_id)))?;
        record.messages.push(message);
        inner.message_chat.insert(message_id, chat_id);
        Ok(())
    }

    async fn messages(&self, chat_id: &ChatId) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .chats
            .get(chat_id)
            .map(|r| r.messages.clone())
            .unwrap_or_default())
    }

    async fn get_message(&self, id: &MessageId) -> Result<Option<Message>, StoreError> {
        let inner = self.inner.read().await;
        let Some(chat_id) = inner.message_chat.get(id) else {
            return Ok(None);
        };
        Ok(inner
            .chats
            .get(chat_id)
            .and_then(|r| r.messages.iter().find(|m| m.id == *id).cloned()))
    }

    async fn delete_messages_from(
        &self,
        chat_id: &ChatId,
        at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let removed: Vec<MessageId> = match inner.chats.get_mut(chat_id) {
            Some(record) => {
                let (gone, kept): (Vec<_>, Vec<_>) = record
                    .messages
                    .drain(..)
                    .partition(|m| m.created_at >= at);
                record.messages = kept;
                gone.into_iter().map(|m| m.id).collect()
            }
            None => return Ok(0),
        };
        for id in &removed {
            inner.message_chat.remove(id);
        }
        Ok(removed.len())
    }

    async fn count_user_messages_since(
        &self,
        owner: &UserId,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let inner = self.inner.read().await;
        let Some(index) = inner.by_owner.get(owner) else {
            return Ok(0);
        };
        let count = index
            .iter()
            .filter_map(|(_, id)| inner.chats.get(id))
            .flat_map(|r| r.messages.iter())
            .filter(|m| m.role == Role::User && m.created_at >= since)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn count_chats(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().await.chats.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parley_core::MessagePart;

    fn chat_at(owner: UserId, at: DateTime<Utc>) -> Chat {
        let mut chat = Chat::new(ChatId::generate(), owner, "t", Visibility::Private);
        chat.updated_at = at;
        chat
    }

    #[tokio::test]
    async fn test_history_index_orders_newest_first() {
        let store = MemoryStore::new();
        let owner = UserId::generate();
        let t0 = Utc::now();
        let old = chat_at(owner, t0);
        let new = chat_at(owner, t0 + Duration::seconds(5));
        store.insert_chat(old.clone()).await.unwrap();
        store.insert_chat(new.clone()).await.unwrap();

        let page = store.chats_older_than(&owner, None, 10).await.unwrap();
        assert_eq!(page.iter().map(|c| c.id).collect::<Vec<_>>(), vec![new.id, old.id]);

        let newer = store
            .chats_newer_than(&owner, old.sort_key(), 10)
            .await
            .unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].id, new.id);
    }

    #[tokio::test]
    async fn test_touch_chat_reindexes_and_never_moves_back() {
        let store = MemoryStore::new();
        let owner = UserId::generate();
        let t0 = Utc::now();
        let a = chat_at(owner, t0);
        let b = chat_at(owner, t0 + Duration::seconds(1));
        store.insert_chat(a.clone()).await.unwrap();
        store.insert_chat(b.clone()).await.unwrap();

        let touched = store
            .touch_chat(&a.id, t0 + Duration::seconds(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(touched.updated_at, t0 + Duration::seconds(2));

        let page = store.chats_older_than(&owner, None, 10).await.unwrap();
        assert_eq!(page[0].id, a.id);
        assert_eq!(page.len(), 2);

        // A stale timestamp leaves the chat where it is
        let stale = store.touch_chat(&a.id, t0).await.unwrap().unwrap();
        assert_eq!(stale.updated_at, t0 + Duration::seconds(2));
        let page = store.chats_older_than(&owner, None, 10).await.unwrap();
        assert_eq!(page[0].id, a.id);
        assert_eq!(page.len(), 2);

        assert!(store
            .touch_chat(&ChatId::generate(), t0)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_set_visibility_keeps_other_fields() {
        let store = MemoryStore::new();
        let owner = UserId::generate();
        let chat = chat_at(owner, Utc::now());
        store.insert_chat(chat.clone()).await.unwrap();

        let updated = store
            .set_visibility(&chat.id, Visibility::Public)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.visibility, Visibility::Public);
        assert_eq!(updated.updated_at, chat.updated_at);
        assert_eq!(
            store.get_chat(&chat.id).await.unwrap().unwrap().visibility,
            Visibility::Public
        );
    }

    #[tokio::test]
    async fn test_delete_messages_from_is_inclusive() {
        let store = MemoryStore::new();
        let owner = UserId::generate();
        let chat = chat_at(owner, Utc::now());
        store.insert_chat(chat.clone()).await.unwrap();

        let t0 = Utc::now();
        for i in 0..3 {
            let mut msg = Message::new(chat.id, Role::User, vec![MessagePart::text("x")]);
            msg.created_at = t0 + Duration::seconds(i);
            store.insert_message(msg).await.unwrap();
        }
        let removed = store
            .delete_messages_from(&chat.id, t0 + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.messages(&chat.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_count_user_messages_ignores_other_roles() {
        let store = MemoryStore::new();
        let owner = UserId::generate();
        let chat = chat_at(owner, Utc::now());
        store.insert_chat(chat.clone()).await.unwrap();
        store
            .insert_message(Message::new(chat.id, Role::User, vec![MessagePart::text("q")]))
            .await
            .unwrap();
        store
            .insert_message(Message::assistant(chat.id, "a"))
            .await
            .unwrap();

        let since = Utc::now() - Duration::hours(24);
        assert_eq!(store.count_user_messages_since(&owner, since).await.unwrap(), 1);
        assert_eq!(
            store
                .count_user_messages_since(&UserId::generate(), since)
                .await
                .unwrap(),
            0
        );
    }
}
