//! Chat handlers: turns, reads, visibility, deletion and stream resume.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use tracing::{debug, info};

use parley_core::request::parse_chat_request;
use parley_core::{
    Chat, ChatError, ChatId, Message, MessageId, Right, Role, StreamPart, Surface,
};

use crate::auth::Caller;
use crate::generation::spawn_generation;
use crate::http::error::ApiError;
use crate::http::responses::{DeletedCountResponse, IdQuery, VisibilityRequest};
use crate::http::sse;
use crate::service::Turn;
use crate::state::AppState;
use crate::stream::Attachment;

fn chat_id(raw: &str) -> Result<ChatId, ApiError> {
    raw.parse::<ChatId>()
        .map_err(|e| ApiError::invalid_parameter("id", e))
}

fn required_id(query: &IdQuery) -> Result<&str, ApiError> {
    query
        .id
        .as_deref()
        .ok_or_else(|| ApiError::missing_parameter("id"))
}

/// `POST /chat` - admit a turn and stream the response.
pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = parse_chat_request(&body)?;
    let session = caller
        .session()
        .copied()
        .ok_or_else(|| ApiError(ChatError::unauthorized(Surface::Chat)))?;

    let Turn { chat, publisher } = state.chats.begin_turn(&session, &request).await?;

    // Subscribe before the producer can publish anything.
    let receiver = publisher
        .subscribe()
        .ok_or_else(|| ApiError(ChatError::offline(Surface::Stream, "stream closed")))?;
    info!(
        chat_id = %chat.id,
        generation_id = %publisher.key().generation_id,
        model = %request.selected_chat_model,
        "Generation started"
    );

    spawn_generation(
        state.chats.clone(),
        state.producer.clone(),
        publisher,
        chat,
        request.selected_chat_model,
    );

    Ok(sse::live(receiver).into_response())
}

/// `DELETE /chat?id=`
pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<IdQuery>,
) -> Result<Json<Chat>, ApiError> {
    let id = chat_id(required_id(&query)?)?;
    let chat = state.chats.delete_chat(&id, caller.user_id()).await?;
    Ok(Json(chat))
}

/// `GET /chat/:id` - a chat readable by the caller.
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Chat>, ApiError> {
    let id = chat_id(&id)?;
    let chat = state
        .chats
        .authorized_chat(&id, caller.user_id(), Right::Read)
        .await?;
    Ok(Json(chat))
}

/// `GET /chat/:id/messages`
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let id = chat_id(&id)?;
    let messages = state.chats.messages(&id, caller.user_id()).await?;
    Ok(Json(messages))
}

/// `PATCH /chat/:id/visibility`
pub async fn set_visibility(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Chat>, ApiError> {
    let id = chat_id(&id)?;
    let request: VisibilityRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError(ChatError::bad_request(Surface::Api, e.to_string())))?;
    let chat = state
        .chats
        .set_visibility(&id, caller.user_id(), request.visibility)
        .await?;
    Ok(Json(chat))
}

/// `DELETE /chat/messages/trailing?id=` - delete a message and everything after it.
pub async fn delete_trailing_messages(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<IdQuery>,
) -> Result<Json<DeletedCountResponse>, ApiError> {
    let id = required_id(&query)?
        .parse::<MessageId>()
        .map_err(|e| ApiError::invalid_parameter("id", e))?;
    let deleted_count = state.chats.delete_trailing(&id, caller.user_id()).await?;
    Ok(Json(DeletedCountResponse { deleted_count }))
}

/// `GET /chat/:id/stream` - re-attach to the chat's generation.
///
/// Attaches to the latest session while it is open. Once it has closed, a
/// reply persisted within the resume window is replayed as a single
/// `data-appendMessage` part so a client that missed the tail still gets the
/// message. Otherwise there is nothing to resume and the answer is 204.
pub async fn resume_stream(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = chat_id(&id)?;
    let chat = state
        .chats
        .authorized_chat(&id, caller.user_id(), Right::Read)
        .await?;

    if let Some(Attachment::Live(receiver)) = state.streams.attach_latest(&chat.id) {
        debug!(chat_id = %chat.id, "Resumed live stream");
        return Ok(sse::live(receiver).into_response());
    }

    let window = chrono::Duration::from_std(state.config.resume_window())
        .unwrap_or_else(|_| chrono::Duration::seconds(15));
    let recent = state
        .chats
        .last_message(&chat.id)
        .await?
        .filter(|m| m.role == Role::Assistant && Utc::now() - m.created_at <= window);

    match recent {
        Some(message) => {
            let part = StreamPart::append_message(&message)
                .map_err(|e| ApiError(ChatError::offline(Surface::Stream, e.to_string())))?;
            debug!(chat_id = %chat.id, message_id = %message.id, "Replayed recent message");
            Ok(sse::fixed(vec![part]).into_response())
        }
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
