//! HTTP request handlers.

mod auth;
mod chat;
mod documents;
mod health;
mod history;

pub use auth::guest_session;
pub use chat::{
    delete_chat, delete_trailing_messages, get_chat, get_messages, post_chat, resume_stream,
    set_visibility,
};
pub use documents::{get_document, rollback_document, save_document};
pub use health::{health_check, metrics_handler};
pub use history::{delete_history, get_history};
