//! Chat and message types for conversation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, MessageId, UserId};

/// Longest title derived from a first message.
pub const MAX_TITLE_CHARS: usize = 80;

/// Role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message (input/prompt).
    User,
    /// Assistant message (response).
    Assistant,
    /// System message (instructions).
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One part of a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessagePart {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "mediaType")]
        media_type: String,
        name: String,
        url: String,
    },
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text { text: text.into() }
    }
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message stamped with the current time.
    pub fn new(chat_id: ChatId, role: Role, parts: Vec<MessagePart>) -> Self {
        Self {
            id: MessageId::generate(),
            chat_id,
            role,
            parts,
            created_at: Utc::now(),
        }
    }

    /// Create an assistant message with a single text part.
    pub fn assistant(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self::new(chat_id, Role::Assistant, vec![MessagePart::text(text)])
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                MessagePart::File { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Who can read a chat besides its owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

/// A conversation owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub owner_id: UserId,
    pub title: String,
    pub visibility: Visibility,
    pub pinned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Create a new chat.
    pub fn new(id: ChatId, owner_id: UserId, title: impl Into<String>, visibility: Visibility) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id,
            title: title.into(),
            visibility,
            pinned: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sort key used by history pagination: most recently active first.
    pub fn sort_key(&self) -> (DateTime<Utc>, ChatId) {
        (self.updated_at, self.id)
    }
}

/// Derive a chat title from the first user message.
pub fn title_from_message(message: &Message) -> String {
    let text = message.text();
    let first_line = text.lines().map(str::trim).find(|l| !l.is_empty());
    match first_line {
        Some(line) => line.chars().take(MAX_TITLE_CHARS).collect(),
        None => "New chat".to_string(),
    }
}
