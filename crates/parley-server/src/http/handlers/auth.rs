//! Guest sign-in.

use axum::Json;
use tracing::info;

use crate::auth::Session;

/// `POST /auth/guest` - mint a guest identity.
pub async fn guest_session() -> Json<Session> {
    let session = Session::guest();
    info!(user_id = %session.user_id, "Guest session issued");
    Json(session)
}
