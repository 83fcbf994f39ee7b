//! HTTP server.
//!
//! Provides endpoints for:
//! - Documents and their versions (`/document`)
//! - Chat history (`/history`)
//! - Chat turns, chats, messages and stream resume (`/chat`)
//! - Guest sign-in (`/auth/guest`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod error;
mod handlers;
pub mod responses;
pub mod sse;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Documents
        .route(
            "/document",
            get(handlers::get_document)
                .post(handlers::save_document)
                .delete(handlers::rollback_document),
        )
        // History
        .route(
            "/history",
            get(handlers::get_history).delete(handlers::delete_history),
        )
        // Chat
        .route(
            "/chat",
            post(handlers::post_chat).delete(handlers::delete_chat),
        )
        .route(
            "/chat/messages/trailing",
            delete(handlers::delete_trailing_messages),
        )
        .route("/chat/:id", get(handlers::get_chat))
        .route("/chat/:id/messages", get(handlers::get_messages))
        .route("/chat/:id/stream", get(handlers::resume_stream))
        .route("/chat/:id/visibility", patch(handlers::set_visibility))
        // Auth
        .route("/auth/guest", post(handlers::guest_session))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use parley_core::{ChatId, DocumentVersion, Message, MessageId, StreamPart, UserId};

    use crate::auth::{USER_HEADER, USER_TYPE_HEADER};
    use crate::config::Config;

    fn test_config() -> Config {
        Config {
            producer_chunk_delay_ms: 0,
            ..Config::default()
        }
    }

    fn app_with(config: Config) -> (Router, Arc<AppState>) {
        let state = AppState::new(config).unwrap();
        (create_router(state.clone()), state)
    }

    fn app() -> Router {
        app_with(test_config()).0
    }

    fn request(method: Method, uri: &str, user: Option<&UserId>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user.to_string());
        }
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn json_body(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    async fn body_text(response: Response) -> String {
        String::from_utf8(body_bytes(response).await).unwrap()
    }

    fn appended_messages(text: &str) -> Vec<Message> {
        text.lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .filter(|data| *data != "[DONE]")
            .map(|data| serde_json::from_str::<StreamPart>(data).unwrap())
            .filter_map(|part| part.appended_message())
            .map(|message| message.unwrap())
            .collect()
    }

    fn chat_body(chat_id: ChatId, text: &str) -> Value {
        json!({
            "id": chat_id.to_string(),
            "message": {
                "id": MessageId::generate().to_string(),
                "role": "user",
                "parts": [{"type": "text", "text": text}],
            },
            "selectedChatModel": "chat-model",
            "selectedVisibilityType": "private",
        })
    }

    fn doc_body(content: &str) -> Value {
        json!({"content": content, "title": "Notes", "kind": "text"})
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = send(&app(), request(Method::GET, "/health", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_document_save_list_and_rollback() {
        let app = app();
        let owner = UserId::generate();

        let first = send(
            &app,
            request(Method::POST, "/document?id=d1", Some(&owner), Some(doc_body("A"))),
        )
        .await;
        assert_eq!(first.status(), StatusCode::OK);
        let first = json_body(first).await;
        let stamp = first["versions"][0]["createdAt"].as_str().unwrap().to_string();

        let second = send(
            &app,
            request(Method::POST, "/document?id=d1", Some(&owner), Some(doc_body("B"))),
        )
        .await;
        assert_eq!(second.status(), StatusCode::OK);

        let list = send(&app, request(Method::GET, "/document?id=d1", Some(&owner), None)).await;
        let versions: Vec<DocumentVersion> = serde_json::from_value(json_body(list).await).unwrap();
        assert_eq!(versions.len(), 2);

        let uri = format!("/document?id=d1&timestamp={}", stamp.replace('+', "%2B"));
        let rollback = send(&app, request(Method::DELETE, &uri, Some(&owner), None)).await;
        assert_eq!(rollback.status(), StatusCode::OK);
        assert_eq!(json_body(rollback).await["deletedCount"], 1);

        let list = send(&app, request(Method::GET, "/document?id=d1", Some(&owner), None)).await;
        let versions: Vec<DocumentVersion> = serde_json::from_value(json_body(list).await).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].content, "A");
    }

    #[tokio::test]
    async fn test_document_ownership_isolation() {
        let app = app();
        let owner = UserId::generate();
        let intruder = UserId::generate();
        send(
            &app,
            request(Method::POST, "/document?id=d1", Some(&owner), Some(doc_body("A"))),
        )
        .await;

        let get = send(&app, request(Method::GET, "/document?id=d1", Some(&intruder), None)).await;
        assert_eq!(get.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(get).await["code"], "forbidden:document");

        let post = send(
            &app,
            request(Method::POST, "/document?id=d1", Some(&intruder), Some(doc_body("X"))),
        )
        .await;
        assert_eq!(post.status(), StatusCode::FORBIDDEN);

        let delete = send(
            &app,
            request(
                Method::DELETE,
                "/document?id=d1&timestamp=2020-01-01T00:00:00Z",
                Some(&intruder),
                None,
            ),
        )
        .await;
        assert_eq!(delete.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_document_anonymous_save_is_not_found() {
        let response = send(
            &app(),
            request(Method::POST, "/document?id=d1", None, Some(doc_body("A"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "not_found:document");
    }

    #[tokio::test]
    async fn test_document_bad_requests() {
        let app = app();
        let user = UserId::generate();

        let missing_id = send(&app, request(Method::GET, "/document", Some(&user), None)).await;
        assert_eq!(missing_id.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(missing_id).await["code"], "bad_request:api");

        let missing_field = send(
            &app,
            request(
                Method::POST,
                "/document?id=d1",
                Some(&user),
                Some(json!({"content": "x", "kind": "text"})),
            ),
        )
        .await;
        assert_eq!(missing_field.status(), StatusCode::BAD_REQUEST);

        let bad_stamp = send(
            &app,
            request(Method::DELETE, "/document?id=d1&timestamp=yesterday", Some(&user), None),
        )
        .await;
        assert_eq!(bad_stamp.status(), StatusCode::BAD_REQUEST);

        let unauthenticated = send(&app, request(Method::GET, "/document?id=d1", None, None)).await;
        assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_history_both_cursors_is_bad_request() {
        let uri = format!(
            "/history?starting_after={}&ending_before={}",
            ChatId::generate(),
            ChatId::generate()
        );
        let app = app();
        let response = send(&app, request(Method::GET, &uri, Some(&UserId::generate()), None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "bad_request:api");

        // validated before the caller is checked
        let anonymous = send(&app, request(Method::GET, &uri, None, None)).await;
        assert_eq!(anonymous.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(anonymous).await["code"], "bad_request:api");

        let malformed = send(
            &app,
            request(Method::GET, "/history?starting_after=nope", Some(&UserId::generate()), None),
        )
        .await;
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(malformed).await["code"], "bad_request:api");
    }

    #[tokio::test]
    async fn test_history_requires_caller() {
        let response = send(&app(), request(Method::GET, "/history", None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chat_turn_streams_and_lands_in_history() {
        let app = app();
        let user = UserId::generate();
        let chat_id = ChatId::generate();

        let response = send(
            &app,
            request(Method::POST, "/chat", Some(&user), Some(chat_body(chat_id, "hello"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("\"type\":\"text-start\""));
        assert!(text.contains("\"type\":\"data-appendMessage\""));
        assert!(text.contains("data: [DONE]"));

        let history = send(&app, request(Method::GET, "/history", Some(&user), None)).await;
        let history = json_body(history).await;
        assert_eq!(history["chats"][0]["id"], chat_id.to_string());
        assert_eq!(history["chats"][0]["title"], "hello");
        assert_eq!(history["hasMore"], false);

        let messages = send(
            &app,
            request(Method::GET, &format!("/chat/{}/messages", chat_id), Some(&user), None),
        )
        .await;
        assert_eq!(json_body(messages).await.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_chat_rejects_malformed_body_before_auth() {
        let response = send(
            &app(),
            Request::builder()
                .method(Method::POST)
                .uri("/chat")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "invalid_data:api");
    }

    #[tokio::test]
    async fn test_guest_quota_exceeded() {
        let (app, _) = app_with(Config {
            guest_messages_per_day: 1,
            ..test_config()
        });
        let guest = UserId::generate();
        let chat_id = ChatId::generate();

        let guest_request = |body: Value| {
            Request::builder()
                .method(Method::POST)
                .uri("/chat")
                .header(USER_HEADER, guest.to_string())
                .header(USER_TYPE_HEADER, "guest")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap()
        };

        let ok = send(&app, guest_request(chat_body(chat_id, "one"))).await;
        assert_eq!(ok.status(), StatusCode::OK);
        body_bytes(ok).await;

        let denied = send(&app, guest_request(chat_body(chat_id, "two"))).await;
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(denied).await["code"], "quota_exceeded:chat");
    }

    #[tokio::test]
    async fn test_resume_replays_recent_reply() {
        let app = app();
        let user = UserId::generate();
        let chat_id = ChatId::generate();
        let turn = send(
            &app,
            request(Method::POST, "/chat", Some(&user), Some(chat_body(chat_id, "hi"))),
        )
        .await;
        body_bytes(turn).await;

        let resume = send(
            &app,
            request(Method::GET, &format!("/chat/{}/stream", chat_id), Some(&user), None),
        )
        .await;
        assert_eq!(resume.status(), StatusCode::OK);
        let text = body_text(resume).await;
        assert!(text.contains("data-appendMessage"));
        assert!(text.contains("data: [DONE]"));
    }

    #[tokio::test]
    async fn test_resume_attaches_to_running_generation() {
        let (app, _) = app_with(Config {
            producer_chunk_delay_ms: 30,
            ..test_config()
        });
        let user = UserId::generate();
        let chat_id = ChatId::generate();
        let turn = send(
            &app,
            request(Method::POST, "/chat", Some(&user), Some(chat_body(chat_id, "hi there"))),
        )
        .await;
        assert_eq!(turn.status(), StatusCode::OK);
        drop(turn);

        let resume = send(
            &app,
            request(Method::GET, &format!("/chat/{}/stream", chat_id), Some(&user), None),
        )
        .await;
        assert_eq!(resume.status(), StatusCode::OK);
        let text = body_text(resume).await;
        assert!(text.contains("\"type\":\"data-appendMessage\""));
        assert!(text.contains("\"type\":\"finish\""));
        assert!(text.contains("data: [DONE]"));

        let live = appended_messages(&text);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].text(), "You said: hi there");
    }

    #[tokio::test]
    async fn test_every_resume_of_a_turn_yields_the_same_reply() {
        let app = app();
        let user = UserId::generate();
        let chat_id = ChatId::generate();
        let turn = send(
            &app,
            request(Method::POST, "/chat", Some(&user), Some(chat_body(chat_id, "hi"))),
        )
        .await;
        let streamed = appended_messages(&body_text(turn).await);

        let mut resumed = Vec::new();
        for _ in 0..2 {
            let resume = send(
                &app,
                request(Method::GET, &format!("/chat/{}/stream", chat_id), Some(&user), None),
            )
            .await;
            assert_eq!(resume.status(), StatusCode::OK);
            resumed.push(appended_messages(&body_text(resume).await));
        }

        assert_eq!(streamed.len(), 1);
        assert_eq!(resumed[0], streamed);
        assert_eq!(resumed[1], streamed);
    }

    #[tokio::test]
    async fn test_resume_outside_window_is_no_content() {
        let (app, state) = app_with(Config {
            resume_window_secs: 0,
            ..test_config()
        });
        let user = UserId::generate();
        let chat_id = ChatId::generate();
        let turn = send(
            &app,
            request(Method::POST, "/chat", Some(&user), Some(chat_body(chat_id, "hi"))),
        )
        .await;
        body_bytes(turn).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(state.streams.open_count(), 0);

        let resume = send(
            &app,
            request(Method::GET, &format!("/chat/{}/stream", chat_id), Some(&user), None),
        )
        .await;
        assert_eq!(resume.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_resume_private_chat_of_other_user_is_forbidden() {
        let app = app();
        let owner = UserId::generate();
        let chat_id = ChatId::generate();
        let turn = send(
            &app,
            request(Method::POST, "/chat", Some(&owner), Some(chat_body(chat_id, "hi"))),
        )
        .await;
        body_bytes(turn).await;

        let resume = send(
            &app,
            request(
                Method::GET,
                &format!("/chat/{}/stream", chat_id),
                Some(&UserId::generate()),
                None,
            ),
        )
        .await;
        assert_eq!(resume.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_get_chat_follows_visibility() {
        let app = app();
        let owner = UserId::generate();
        let stranger = UserId::generate();
        let chat_id = ChatId::generate();
        let turn = send(
            &app,
            request(Method::POST, "/chat", Some(&owner), Some(chat_body(chat_id, "hi"))),
        )
        .await;
        body_bytes(turn).await;
        let uri = format!("/chat/{}", chat_id);

        let own = send(&app, request(Method::GET, &uri, Some(&owner), None)).await;
        assert_eq!(own.status(), StatusCode::OK);
        let own = json_body(own).await;
        assert_eq!(own["id"], chat_id.to_string());
        assert_eq!(own["visibility"], "private");

        let hidden = send(&app, request(Method::GET, &uri, Some(&stranger), None)).await;
        assert_eq!(hidden.status(), StatusCode::FORBIDDEN);

        let patched = send(
            &app,
            request(
                Method::PATCH,
                &format!("/chat/{}/visibility", chat_id),
                Some(&owner),
                Some(json!({"visibility": "public"})),
            ),
        )
        .await;
        body_bytes(patched).await;

        let shared = send(&app, request(Method::GET, &uri, Some(&stranger), None)).await;
        assert_eq!(shared.status(), StatusCode::OK);
        assert_eq!(json_body(shared).await["visibility"], "public");

        let missing = send(
            &app,
            request(Method::GET, &format!("/chat/{}", ChatId::generate()), Some(&owner), None),
        )
        .await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_visibility_and_trailing_delete() {
        let app = app();
        let owner = UserId::generate();
        let chat_id = ChatId::generate();
        let turn = send(
            &app,
            request(Method::POST, "/chat", Some(&owner), Some(chat_body(chat_id, "hi"))),
        )
        .await;
        body_bytes(turn).await;

        let patched = send(
            &app,
            request(
                Method::PATCH,
                &format!("/chat/{}/visibility", chat_id),
                Some(&owner),
                Some(json!({"visibility": "public"})),
            ),
        )
        .await;
        assert_eq!(patched.status(), StatusCode::OK);
        assert_eq!(json_body(patched).await["visibility"], "public");

        let messages = send(
            &app,
            request(
                Method::GET,
                &format!("/chat/{}/messages", chat_id),
                Some(&UserId::generate()),
                None,
            ),
        )
        .await;
        assert_eq!(messages.status(), StatusCode::OK);
        let messages = json_body(messages).await;
        let first_id = messages[0]["id"].as_str().unwrap().to_string();

        let deleted = send(
            &app,
            request(
                Method::DELETE,
                &format!("/chat/messages/trailing?id={}", first_id),
                Some(&owner),
                None,
            ),
        )
        .await;
        assert_eq!(deleted.status(), StatusCode::OK);
        assert_eq!(json_body(deleted).await["deletedCount"], 2);
    }

    #[tokio::test]
    async fn test_delete_chat_and_history() {
        let app = app();
        let owner = UserId::generate();
        for _ in 0..2 {
            let turn = send(
                &app,
                request(
                    Method::POST,
                    "/chat",
                    Some(&owner),
                    Some(chat_body(ChatId::generate(), "hi")),
                ),
            )
            .await;
            body_bytes(turn).await;
        }

        let page = json_body(send(&app, request(Method::GET, "/history", Some(&owner), None)).await).await;
        let first = page["chats"][0]["id"].as_str().unwrap().to_string();

        let deleted = send(
            &app,
            request(Method::DELETE, &format!("/chat?id={}", first), Some(&owner), None),
        )
        .await;
        assert_eq!(deleted.status(), StatusCode::OK);

        let cleared = send(&app, request(Method::DELETE, "/history", Some(&owner), None)).await;
        assert_eq!(json_body(cleared).await["deletedCount"], 1);
    }

    #[tokio::test]
    async fn test_guest_sign_in() {
        let response = send(&app(), request(Method::POST, "/auth/guest", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["userType"], "guest");
        assert!(body["userId"].as_str().unwrap().parse::<UserId>().is_ok());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let response = send(&app(), request(Method::GET, "/metrics", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("parley_chats_total 0"));
    }
}
