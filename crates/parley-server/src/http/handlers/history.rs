//! History handlers.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};

use parley_core::{ChatId, HistoryPage};

use crate::auth::Caller;
use crate::http::error::ApiError;
use crate::http::responses::{DeletedCountResponse, HistoryQuery};
use crate::state::AppState;

fn parse_cursor(name: &str, raw: Option<&str>) -> Result<Option<ChatId>, ApiError> {
    raw.map(|raw| {
        raw.parse::<ChatId>()
            .map_err(|e| ApiError::invalid_parameter(name, e))
    })
    .transpose()
}

/// `GET /history` - one page of the caller's chats.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    let limit = query
        .limit
        .as_deref()
        .map(|raw| {
            raw.parse::<usize>()
                .map_err(|e| ApiError::invalid_parameter("limit", e))
        })
        .transpose()?;
    let starting_after = parse_cursor("starting_after", query.starting_after.as_deref())?;
    let ending_before = parse_cursor("ending_before", query.ending_before.as_deref())?;

    let page = state
        .history
        .page(caller.user_id(), limit, starting_after, ending_before)
        .await?;
    Ok(Json(page))
}

/// `DELETE /history` - delete all of the caller's chats.
pub async fn delete_history(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<DeletedCountResponse>, ApiError> {
    let deleted_count = state.history.delete_all(caller.user_id()).await?;
    Ok(Json(DeletedCountResponse { deleted_count }))
}
