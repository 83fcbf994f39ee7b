//! HTTP client for the Parley server.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use parley_core::{
    ArtifactKind, Chat, ChatId, Document, DocumentId, DocumentVersion, ErrorBody, HistoryPage,
    Message, MessageId, PostRequestBody, UserId, UserType, Visibility,
};

use crate::error::ClientError;
use crate::resume::StreamResumer;
use crate::sse::{part_stream, PartStream};
use crate::visibility::VisibilityApi;

const USER_HEADER: &str = "x-parley-user";
const USER_TYPE_HEADER: &str = "x-parley-user-type";

/// Who the client acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: UserId,
    pub user_type: UserType,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeletedCount {
    deleted_count: usize,
}

/// HTTP client for the Parley API.
#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
    identity: Option<Identity>,
}

impl HttpClient {
    /// Create a new anonymous HTTP client.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            identity: None,
        }
    }

    /// Act as `identity` for subsequent requests.
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "HTTP request");
        let builder = self.inner.request(method, url);
        match &self.identity {
            Some(identity) => builder
                .header(USER_HEADER, identity.user_id.to_string())
                .header(USER_TYPE_HEADER, identity.user_type.as_str()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().await?;
        match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(body) => Err(ClientError::Api(body.into_error())),
            Err(_) => Err(ClientError::Status(status.as_u16())),
        }
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Serialization(e.to_string()))
    }

    /// Check if the server is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let response = self.request(Method::GET, "/health").send().await?;
        Ok(response.status().is_success())
    }

    /// Mint a guest identity. The returned client acts as that guest.
    pub async fn sign_in_guest(&self) -> Result<(Self, Identity), ClientError> {
        let identity: Identity = self.json(self.request(Method::POST, "/auth/guest")).await?;
        Ok((self.clone().with_identity(identity), identity))
    }

    // ========================================================================
    // Documents
    // ========================================================================

    pub async fn document_versions(
        &self,
        id: &DocumentId,
    ) -> Result<Vec<DocumentVersion>, ClientError> {
        self.json(
            self.request(Method::GET, "/document")
                .query(&[("id", id.as_str())]),
        )
        .await
    }

    pub async fn save_document(
        &self,
        id: &DocumentId,
        title: &str,
        content: &str,
        kind: ArtifactKind,
    ) -> Result<Document, ClientError> {
        self.json(
            self.request(Method::POST, "/document")
                .query(&[("id", id.as_str())])
                .json(&json!({ "title": title, "content": content, "kind": kind })),
        )
        .await
    }

    /// Delete versions created after `after`. Returns how many were removed.
    pub async fn rollback_document(
        &self,
        id: &DocumentId,
        after: DateTime<Utc>,
    ) -> Result<usize, ClientError> {
        let timestamp = after.to_rfc3339_opts(SecondsFormat::Millis, true);
        let deleted: DeletedCount = self
            .json(
                self.request(Method::DELETE, "/document")
                    .query(&[("id", id.as_str()), ("timestamp", timestamp.as_str())]),
            )
            .await?;
        Ok(deleted.deleted_count)
    }

    // ========================================================================
    // History
    // ========================================================================

    pub async fn history(
        &self,
        limit: Option<usize>,
        starting_after: Option<ChatId>,
        ending_before: Option<ChatId>,
    ) -> Result<HistoryPage, ClientError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(id) = starting_after {
            query.push(("starting_after", id.to_string()));
        }
        if let Some(id) = ending_before {
            query.push(("ending_before", id.to_string()));
        }
        self.json(self.request(Method::GET, "/history").query(&query))
            .await
    }

    pub async fn delete_history(&self) -> Result<usize, ClientError> {
        let deleted: DeletedCount = self.json(self.request(Method::DELETE, "/history")).await?;
        Ok(deleted.deleted_count)
    }

    // ========================================================================
    // Chats
    // ========================================================================

    /// Start a chat turn and stream its parts.
    pub async fn send_chat(&self, body: &PostRequestBody) -> Result<PartStream, ClientError> {
        let response = self
            .send(self.request(Method::POST, "/chat").json(body))
            .await?;
        Ok(part_stream(response))
    }

    /// Re-attach to a chat's stream. `None` when there is nothing to resume.
    pub async fn resume_chat(&self, chat_id: &ChatId) -> Result<Option<PartStream>, ClientError> {
        let path = format!("/chat/{}/stream", chat_id);
        let response = self.send(self.request(Method::GET, &path)).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(part_stream(response)))
    }

    pub async fn chat(&self, chat_id: &ChatId) -> Result<Chat, ClientError> {
        let path = format!("/chat/{}", chat_id);
        self.json(self.request(Method::GET, &path)).await
    }

    pub async fn messages(&self, chat_id: &ChatId) -> Result<Vec<Message>, ClientError> {
        let path = format!("/chat/{}/messages", chat_id);
        self.json(self.request(Method::GET, &path)).await
    }

    pub async fn set_visibility(
        &self,
        chat_id: &ChatId,
        visibility: Visibility,
    ) -> Result<Chat, ClientError> {
        let path = format!("/chat/{}/visibility", chat_id);
        self.json(
            self.request(Method::PATCH, &path)
                .json(&json!({ "visibility": visibility })),
        )
        .await
    }

    pub async fn delete_chat(&self, chat_id: &ChatId) -> Result<Chat, ClientError> {
        self.json(
            self.request(Method::DELETE, "/chat")
                .query(&[("id", chat_id.to_string())]),
        )
        .await
    }

    /// Delete a message and every later message of its chat.
    pub async fn delete_trailing_messages(
        &self,
        message_id: &MessageId,
    ) -> Result<usize, ClientError> {
        let deleted: DeletedCount = self
            .json(
                self.request(Method::DELETE, "/chat/messages/trailing")
                    .query(&[("id", message_id.to_string())]),
            )
            .await?;
        Ok(deleted.deleted_count)
    }
}

#[async_trait]
impl StreamResumer for HttpClient {
    async fn resume(&self, chat_id: ChatId) -> Result<Option<PartStream>, ClientError> {
        self.resume_chat(&chat_id).await
    }
}

#[async_trait]
impl VisibilityApi for HttpClient {
    async fn update_visibility(
        &self,
        chat_id: ChatId,
        visibility: Visibility,
    ) -> Result<(), ClientError> {
        self.set_visibility(&chat_id, visibility).await.map(|_| ())
    }
}
