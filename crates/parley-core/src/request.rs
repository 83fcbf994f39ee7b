//! Validation of incoming chat requests.
//!
//! A chat request carries either one new user message (normal turn) or the
//! full list of already-persisted messages (resume after a tool approval).
//! The two shapes are validated by different rules: new messages are user
//! input and strictly checked, replayed messages are trusted content and
//! only checked for shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{MessagePart, Visibility};
use crate::error::{ChatError, Surface};
use crate::ids::{ChatId, MessageId};

/// Longest accepted text part, in characters.
pub const MAX_TEXT_CHARS: usize = 2000;

/// Longest accepted file name, in characters.
pub const MAX_FILE_NAME_CHARS: usize = 100;

/// Media types accepted for file parts.
pub const ALLOWED_MEDIA_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Model identifiers a client may select.
pub const CHAT_MODELS: &[&str] = &["chat-model", "chat-model-reasoning"];

/// Raw request body of `POST /chat`, as sent on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRequestBody {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<RawMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<RawMessage>>,
    pub selected_chat_model: String,
    pub selected_visibility_type: Visibility,
}

/// Message as received, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Value>,
}

/// A new user message that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub id: MessageId,
    pub parts: Vec<MessagePart>,
}

/// The two accepted request shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatPayload {
    /// Normal turn submission.
    NewMessage(UserMessage),
    /// Replay of every prior message, used to resume after a tool approval.
    ReplayMessages(Vec<RawMessage>),
}

/// A validated chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub chat_id: ChatId,
    pub payload: ChatPayload,
    pub selected_chat_model: String,
    pub visibility: Visibility,
}

/// Parse and validate a request body.
pub fn parse_chat_request(body: &[u8]) -> Result<ChatRequest, ChatError> {
    let raw: PostRequestBody =
        serde_json::from_slice(body).map_err(|e| ChatError::invalid_data(e.to_string()))?;
    raw.validate()
}

impl PostRequestBody {
    /// Validate this body into a typed request.
    pub fn validate(self) -> Result<ChatRequest, ChatError> {
        let chat_id = self
            .id
            .parse::<ChatId>()
            .map_err(|_| ChatError::invalid_data("id must be a UUID"))?;

        if !CHAT_MODELS.contains(&self.selected_chat_model.as_str()) {
            return Err(ChatError::invalid_data(format!(
                "unknown model: {}",
                self.selected_chat_model
            )));
        }

        let payload = match (self.message, self.messages) {
            (Some(message), None) => ChatPayload::NewMessage(validate_user_message(message)?),
            (None, Some(messages)) => ChatPayload::ReplayMessages(validate_replay(messages)?),
            (Some(_), Some(_)) => {
                return Err(ChatError::bad_request(
                    Surface::Api,
                    "Only one of message or messages can be provided.",
                ))
            }
            (None, None) => {
                return Err(ChatError::bad_request(
                    Surface::Api,
                    "One of message or messages is required.",
                ))
            }
        };

        Ok(ChatRequest {
            chat_id,
            payload,
            selected_chat_model: self.selected_chat_model,
            visibility: self.selected_visibility_type,
        })
    }
}

fn validate_user_message(raw: RawMessage) -> Result<UserMessage, ChatError> {
    let id = raw
        .id
        .parse::<MessageId>()
        .map_err(|_| ChatError::invalid_data("message.id must be a UUID"))?;

    if raw.role != "user" {
        return Err(ChatError::invalid_data("message.role must be user"));
    }

    let parts = raw
        .parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| validate_part(i, part))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(UserMessage { id, parts })
}

fn validate_part(index: usize, part: Value) -> Result<MessagePart, ChatError> {
    let part: MessagePart = serde_json::from_value(part)
        .map_err(|e| ChatError::invalid_data(format!("parts[{}]: {}", index, e)))?;

    match &part {
        MessagePart::Text { text } => {
            let len = text.chars().count();
            if len == 0 || len > MAX_TEXT_CHARS {
                return Err(ChatError::invalid_data(format!(
                    "parts[{}]: text must be 1..={} characters",
                    index, MAX_TEXT_CHARS
                )));
            }
        }
        MessagePart::File {
            media_type,
            name,
            url,
        } => {
            if !ALLOWED_MEDIA_TYPES.contains(&media_type.as_str()) {
                return Err(ChatError::invalid_data(format!(
                    "parts[{}]: unsupported media type {}",
                    index, media_type
                )));
            }
            let len = name.chars().count();
            if len == 0 || len > MAX_FILE_NAME_CHARS {
                return Err(ChatError::invalid_data(format!(
                    "parts[{}]: name must be 1..={} characters",
                    index, MAX_FILE_NAME_CHARS
                )));
            }
            url::Url::parse(url)
                .map_err(|e| ChatError::invalid_data(format!("parts[{}]: url {}", index, e)))?;
        }
    }

    Ok(part)
}

fn validate_replay(messages: Vec<RawMessage>) -> Result<Vec<RawMessage>, ChatError> {
    if messages.is_empty() {
        return Err(ChatError::invalid_data("messages must not be empty"));
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn body(extra: Value) -> Vec<u8> {
        let mut base = json!({
            "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "selectedChatModel": "chat-model",
            "selectedVisibilityType": "private",
        });
        for (k, v) in extra.as_object().unwrap() {
            base[k] = v.clone();
        }
        serde_json::to_vec(&base).unwrap()
    }

    fn user_message(parts: Value) -> Value {
        json!({
            "id": "0f8fad5b-d9cb-469f-a165-70867728950e",
            "role": "user",
            "parts": parts,
        })
    }

    #[test]
    fn test_single_message_accepted() {
        let req = parse_chat_request(&body(json!({
            "message": user_message(json!([{"type": "text", "text": "hello"}]))
        })))
        .unwrap();

        match req.payload {
            ChatPayload::NewMessage(msg) => {
                assert_eq!(msg.parts, vec![MessagePart::text("hello")]);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert_eq!(req.visibility, Visibility::Private);
    }

    #[test]
    fn test_replay_is_permissive() {
        let req = parse_chat_request(&body(json!({
            "messages": [
                {"id": "not-a-uuid", "role": "assistant", "parts": [{"type": "tool-call", "anything": 1}]}
            ]
        })))
        .unwrap();
        assert!(matches!(req.payload, ChatPayload::ReplayMessages(ref m) if m.len() == 1));
    }

    #[test]
    fn test_neither_or_both_is_bad_request() {
        let err = parse_chat_request(&body(json!({}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRequest);

        let err = parse_chat_request(&body(json!({
            "message": user_message(json!([{"type": "text", "text": "hi"}])),
            "messages": [],
        })))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::BadRequest);
    }

    #[test]
    fn test_text_length_bounds() {
        let empty = body(json!({ "message": user_message(json!([{"type": "text", "text": ""}])) }));
        assert_eq!(parse_chat_request(&empty).unwrap_err().kind, ErrorKind::InvalidData);

        let long_text = "a".repeat(MAX_TEXT_CHARS + 1);
        let long = body(json!({ "message": user_message(json!([{"type": "text", "text": long_text}])) }));
        assert_eq!(parse_chat_request(&long).unwrap_err().kind, ErrorKind::InvalidData);

        let max_text = "a".repeat(MAX_TEXT_CHARS);
        let max = body(json!({ "message": user_message(json!([{"type": "text", "text": max_text}])) }));
        assert!(parse_chat_request(&max).is_ok());
    }

    #[test]
    fn test_file_part_rules() {
        let file = |media: &str, name: &str, url: &str| {
            body(json!({ "message": user_message(json!([{
                "type": "file", "mediaType": media, "name": name, "url": url
            }])) }))
        };

        assert!(parse_chat_request(&file("image/png", "a.png", "https://cdn.example.com/a.png")).is_ok());
        assert!(parse_chat_request(&file("application/pdf", "a.pdf", "https://x.io/a")).is_err());
        assert!(parse_chat_request(&file("image/png", "", "https://x.io/a")).is_err());
        assert!(parse_chat_request(&file("image/png", &"n".repeat(101), "https://x.io/a")).is_err());
        assert!(parse_chat_request(&file("image/jpeg", "a.jpg", "not a url")).is_err());
    }

    #[test]
    fn test_new_message_must_be_from_user() {
        let mut msg = user_message(json!([{"type": "text", "text": "hi"}]));
        msg["role"] = json!("assistant");
        let err = parse_chat_request(&body(json!({ "message": msg }))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidData);
    }

    #[test]
    fn test_malformed_json_is_invalid_data() {
        let err = parse_chat_request(b"{not json").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidData);

        let err = parse_chat_request(&body(json!({"selectedVisibilityType": "friends"}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidData);
    }

    #[test]
    fn test_unknown_model_rejected() {
        let err = parse_chat_request(&body(json!({
            "selectedChatModel": "gpt-unknown",
            "message": user_message(json!([{"type": "text", "text": "hi"}])),
        })))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidData);
    }
}
