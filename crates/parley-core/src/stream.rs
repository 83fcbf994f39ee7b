//! Parts of a generation event stream.

use serde::{Deserialize, Serialize};

use crate::chat::Message;
use crate::document::ArtifactKind;
use crate::error::CoreError;

/// One unit of a generation stream. Delivery order equals generation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamPart {
    /// A text block starts.
    #[serde(rename = "text-start")]
    TextStart { id: String },

    /// Incremental text for an open block.
    #[serde(rename = "text-delta")]
    TextDelta { id: String, delta: String },

    /// A text block ends.
    #[serde(rename = "text-end")]
    TextEnd { id: String },

    /// Kind of the document being produced alongside the answer.
    #[serde(rename = "data-kind")]
    DataKind { data: ArtifactKind },

    /// Id of the document being produced.
    #[serde(rename = "data-id")]
    DataId { data: String },

    /// Title of the document being produced.
    #[serde(rename = "data-title")]
    DataTitle { data: String },

    /// Document content is reset.
    #[serde(rename = "data-clear")]
    DataClear,

    /// Incremental document content.
    #[serde(rename = "data-textDelta")]
    DataTextDelta { data: String },

    /// Document generation finished.
    #[serde(rename = "data-finish")]
    DataFinish,

    /// A complete message (JSON) for consumers that missed the live parts.
    #[serde(rename = "data-appendMessage")]
    DataAppendMessage { data: String },

    /// Generation finished.
    #[serde(rename = "finish")]
    Finish {
        #[serde(rename = "finishReason", default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },

    /// Generation failed.
    #[serde(rename = "error")]
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
}

impl StreamPart {
    /// Wrap a full message for late-joining consumers.
    pub fn append_message(message: &Message) -> Result<Self, CoreError> {
        let data =
            serde_json::to_string(message).map_err(|e| CoreError::Serialization(e.to_string()))?;
        Ok(StreamPart::DataAppendMessage { data })
    }

    /// Decode the message carried by a `data-appendMessage` part.
    /// Returns `None` for every other kind.
    pub fn appended_message(&self) -> Option<Result<Message, CoreError>> {
        match self {
            StreamPart::DataAppendMessage { data } => Some(
                serde_json::from_str(data).map_err(|e| CoreError::Serialization(e.to_string())),
            ),
            _ => None,
        }
    }

    /// Wire name of this part's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamPart::TextStart { .. } => "text-start",
            StreamPart::TextDelta { .. } => "text-delta",
            StreamPart::TextEnd { .. } => "text-end",
            StreamPart::DataKind { .. } => "data-kind",
            StreamPart::DataId { .. } => "data-id",
            StreamPart::DataTitle { .. } => "data-title",
            StreamPart::DataClear => "data-clear",
            StreamPart::DataTextDelta { .. } => "data-textDelta",
            StreamPart::DataFinish => "data-finish",
            StreamPart::DataAppendMessage { .. } => "data-appendMessage",
            StreamPart::Finish { .. } => "finish",
            StreamPart::Error { .. } => "error",
        }
    }

    /// Returns true if no part follows this one in the same stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamPart::Finish { .. } | StreamPart::Error { .. })
    }
}
