//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use parley_core::CoreError;

use crate::auth::{Authenticator, HeaderAuthenticator};
use crate::config::Config;
use crate::generation::{EchoProducer, PartProducer};
use crate::repo::{ChatRepository, DocumentRepository, MemoryStore};
use crate::service::{ChatService, HistoryPaginator, VersionStore};
use crate::stream::StreamRegistry;

/// Shared application state.
pub struct AppState {
    pub config: Config,

    /// Document version history.
    pub versions: VersionStore,

    /// Per-user chat history windows.
    pub history: HistoryPaginator,

    /// Chats, messages and turns.
    pub chats: Arc<ChatService>,

    /// In-flight generation sessions.
    pub streams: Arc<StreamRegistry>,

    /// Model response producer.
    pub producer: Arc<dyn PartProducer>,

    /// Resolves the caller of each request.
    pub authenticator: Arc<dyn Authenticator>,

    pub documents: Arc<dyn DocumentRepository>,
    pub chat_repo: Arc<dyn ChatRepository>,
}

impl AppState {
    /// Create state over the in-memory store with the built-in producer.
    pub fn new(config: Config) -> Result<Arc<Self>, CoreError> {
        let store = Arc::new(MemoryStore::new());
        let producer = Arc::new(EchoProducer::new(Duration::from_millis(
            config.producer_chunk_delay_ms,
        )));
        Self::with_parts(
            config,
            store.clone(),
            store,
            producer,
            Arc::new(HeaderAuthenticator),
        )
    }

    /// Create state from explicit components.
    pub fn with_parts(
        config: Config,
        documents: Arc<dyn DocumentRepository>,
        chat_repo: Arc<dyn ChatRepository>,
        producer: Arc<dyn PartProducer>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Arc<Self>, CoreError> {
        let entitlements = config.entitlements()?;
        let streams = Arc::new(StreamRegistry::new(
            config.stream_buffer,
            config.stream_retention(),
        ));

        Ok(Arc::new(Self {
            versions: VersionStore::new(documents.clone()),
            history: HistoryPaginator::new(
                chat_repo.clone(),
                streams.clone(),
                config.max_page_size,
            ),
            chats: Arc::new(ChatService::new(
                chat_repo.clone(),
                streams.clone(),
                entitlements,
            )),
            streams,
            producer,
            authenticator,
            documents,
            chat_repo,
            config,
        }))
    }
}
