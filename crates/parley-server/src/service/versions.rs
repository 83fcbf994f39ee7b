//! Version store: append-only document history with timestamp rollback.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use parley_core::{
    authorize, ArtifactKind, ChatError, Document, DocumentId, DocumentVersion, ResourceOwner,
    Right, Surface, UserId,
};

use crate::repo::DocumentRepository;

/// Source of "now" for version timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Content of one save.
#[derive(Debug, Clone)]
pub struct SaveDocument {
    pub title: String,
    pub content: String,
    pub kind: ArtifactKind,
}

/// Serializes writes per document and stamps versions.
pub struct VersionStore {
    repo: Arc<dyn DocumentRepository>,
    locks: parking_lot::Mutex<HashMap<DocumentId, Arc<Mutex<()>>>>,
    clock: Clock,
}

impl VersionStore {
    pub fn new(repo: Arc<dyn DocumentRepository>) -> Self {
        Self::with_clock(repo, Arc::new(Utc::now))
    }

    pub fn with_clock(repo: Arc<dyn DocumentRepository>, clock: Clock) -> Self {
        Self {
            repo,
            locks: parking_lot::Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock_for(&self, id: &DocumentId) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(id.clone()).or_default())
    }

    fn release(&self, id: &DocumentId, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock();
        // map + this handle: nobody else is waiting
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
    }

    /// Millisecond timestamp strictly after `last`.
    fn next_stamp(&self, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = (self.clock)();
        let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        match last {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        }
    }

    /// Create the document, or append a version if it already exists.
    pub async fn save(
        &self,
        id: &DocumentId,
        caller: Option<&UserId>,
        input: SaveDocument,
    ) -> Result<Document, ChatError> {
        let caller = caller.ok_or_else(|| ChatError::unauthorized(Surface::Document))?;

        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().await;
            self.save_locked(id, caller, input).await
        };
        self.release(id, lock);
        result
    }

    async fn save_locked(
        &self,
        id: &DocumentId,
        caller: &UserId,
        input: SaveDocument,
    ) -> Result<Document, ChatError> {
        let existing = self
            .repo
            .get(id)
            .await
            .map_err(|e| e.into_chat_error(Surface::Document))?;

        match existing {
            None => {
                let version = DocumentVersion {
                    sequence: 1,
                    title: input.title,
                    content: input.content,
                    kind: input.kind,
                    created_at: self.next_stamp(None),
                };
                let document = Document::new(id.clone(), *caller, version);
                self.repo
                    .create(document.clone())
                    .await
                    .map_err(|e| e.into_chat_error(Surface::Document))?;
                info!(document_id = %id, owner = %caller, "Document created");
                Ok(document)
            }
            Some(mut document) => {
                authorize(
                    Some(&ResourceOwner::private(document.owner_id)),
                    Some(caller),
                    Right::Write,
                )
                .map_err(|d| d.into_error(Surface::Document))?;

                let (last_at, last_seq) = document.last_stamp();
                let version = DocumentVersion {
                    sequence: last_seq + 1,
                    title: input.title,
                    content: input.content,
                    kind: input.kind,
                    created_at: self.next_stamp(Some(last_at)),
                };
                self.repo
                    .append_version(id, version.clone())
                    .await
                    .map_err(|e| e.into_chat_error(Surface::Document))?;
                document.push_version(version);
                debug!(
                    document_id = %id,
                    versions = document.versions.len(),
                    "Document version appended"
                );
                Ok(document)
            }
        }
    }

    /// All versions of a document, oldest first. Owner only.
    pub async fn list_versions(
        &self,
        id: &DocumentId,
        caller: Option<&UserId>,
    ) -> Result<Vec<DocumentVersion>, ChatError> {
        let caller = caller.ok_or_else(|| ChatError::unauthorized(Surface::Document))?;
        let document = self.owned_document(id, caller, Right::Read).await?;
        Ok(document.versions)
    }

    /// Delete versions created after `after`. The first version always survives.
    pub async fn rollback(
        &self,
        id: &DocumentId,
        caller: Option<&UserId>,
        after: DateTime<Utc>,
    ) -> Result<usize, ChatError> {
        let caller = caller.ok_or_else(|| ChatError::unauthorized(Surface::Document))?;

        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().await;
            self.rollback_locked(id, caller, after).await
        };
        self.release(id, lock);
        result
    }

    async fn rollback_locked(
        &self,
        id: &DocumentId,
        caller: &UserId,
        after: DateTime<Utc>,
    ) -> Result<usize, ChatError> {
        let mut document = self.owned_document(id, caller, Right::Write).await?;

        // Resolve the effective cutoff locally so an early cutoff keeps the first version.
        document.truncate_after(after);
        let keep_through = document.current().created_at;

        let removed = self
            .repo
            .delete_versions_after(id, keep_through)
            .await
            .map_err(|e| e.into_chat_error(Surface::Document))?;
        info!(document_id = %id, removed, "Document rolled back");
        Ok(removed)
    }

    async fn owned_document(
        &self,
        id: &DocumentId,
        caller: &UserId,
        right: Right,
    ) -> Result<Document, ChatError> {
        let document = self
            .repo
            .get(id)
            .await
            .map_err(|e| e.into_chat_error(Surface::Document))?;
        let owner = document
            .as_ref()
            .map(|d| ResourceOwner::private(d.owner_id));
        authorize(owner.as_ref(), Some(caller), right)
            .map_err(|d| d.into_error(Surface::Document))?;
        document.ok_or_else(|| ChatError::not_found(Surface::Document))
    }
}
