//! Document handlers.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};

use parley_core::{
    ArtifactKind, ChatError, Document, DocumentId, DocumentVersion, ErrorKind, Surface,
};

use crate::auth::Caller;
use crate::http::error::ApiError;
use crate::http::responses::{DeletedCountResponse, DocumentQuery, SaveDocumentRequest};
use crate::service::SaveDocument;
use crate::state::AppState;

fn document_id(query: &DocumentQuery) -> Result<DocumentId, ApiError> {
    query
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(DocumentId::from)
        .ok_or_else(|| ApiError::missing_parameter("id"))
}

/// `GET /document?id=` - all versions, oldest first.
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<DocumentQuery>,
) -> Result<Json<Vec<DocumentVersion>>, ApiError> {
    let id = document_id(&query)?;
    let versions = state.versions.list_versions(&id, caller.user_id()).await?;
    Ok(Json(versions))
}

/// `POST /document?id=` - create the document or append a version.
pub async fn save_document(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<DocumentQuery>,
    body: Bytes,
) -> Result<Json<Document>, ApiError> {
    let id = document_id(&query)?;
    // Anonymous callers are not told whether the document exists.
    let user_id = caller
        .user_id()
        .ok_or_else(|| ApiError(ChatError::not_found(Surface::Document)))?;

    let request: SaveDocumentRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError(ChatError::bad_request(Surface::Api, e.to_string())))?;
    let content = request
        .content
        .ok_or_else(|| ApiError::missing_parameter("content"))?;
    let title = request
        .title
        .ok_or_else(|| ApiError::missing_parameter("title"))?;
    let kind = request
        .kind
        .ok_or_else(|| ApiError::missing_parameter("kind"))?
        .parse::<ArtifactKind>()
        .map_err(|e| ApiError::invalid_parameter("kind", e))?;

    let document = state
        .versions
        .save(&id, Some(user_id), SaveDocument { title, content, kind })
        .await
        .map_err(|e| match e.kind {
            ErrorKind::Unauthorized => ChatError::not_found(Surface::Document),
            _ => e,
        })?;
    Ok(Json(document))
}

/// `DELETE /document?id=&timestamp=` - delete versions newer than `timestamp`.
pub async fn rollback_document(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<DocumentQuery>,
) -> Result<Json<DeletedCountResponse>, ApiError> {
    let id = document_id(&query)?;
    let raw = query
        .timestamp
        .as_deref()
        .ok_or_else(|| ApiError::missing_parameter("timestamp"))?;
    let after = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| ApiError::invalid_parameter("timestamp", e))?
        .with_timezone(&Utc);

    let deleted_count = state.versions.rollback(&id, caller.user_id(), after).await?;
    Ok(Json(DeletedCountResponse { deleted_count }))
}
