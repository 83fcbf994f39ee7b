//! Domain services over the repositories.

pub mod chats;
pub mod history;
pub mod versions;

pub use chats::{ChatService, Turn};
pub use history::HistoryPaginator;
pub use versions::{SaveDocument, VersionStore};
