//! Parley Core Domain Types
//!
//! This crate contains pure domain types and rules with no dependencies on:
//! - Network/HTTP
//! - Database
//! - Runtime specifics
//!
//! The entitlement gate, ownership guard and chat request validator live
//! here because they are pure functions over these types.

pub mod chat;
pub mod document;
pub mod entitlement;
pub mod error;
pub mod history;
pub mod ids;
pub mod ownership;
pub mod request;
pub mod stream;

// Re-export commonly used types
pub use chat::{Chat, Message, MessagePart, Role, Visibility};
pub use document::{ArtifactKind, Document, DocumentVersion};
pub use entitlement::{EntitlementTable, Entitlements, QuotaDecision, UserType};
pub use error::{ChatError, CoreError, ErrorBody, ErrorKind, Surface};
pub use history::{HistoryPage, PageCursor, PageRequest};
pub use ids::{ChatId, DocumentId, GenerationId, MessageId, UserId};
pub use ownership::{authorize, Denial, ResourceOwner, Right};
pub use request::{ChatPayload, ChatRequest, PostRequestBody, RawMessage, UserMessage};
pub use stream::StreamPart;
