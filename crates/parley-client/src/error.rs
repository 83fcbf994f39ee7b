//! Error types for the Parley client.

use parley_core::ChatError;
use thiserror::Error;

/// Errors that can occur when using the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with an error body.
    #[error("server error: {0}")]
    Api(ChatError),

    /// The server answered with an error status and no decodable body.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// A stream ended without its terminator; parts may be missing.
    #[error("stream interrupted before completion")]
    Interrupted,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    /// The server-side error, if the failure came from the server.
    pub fn chat_error(&self) -> Option<&ChatError> {
        match self {
            ClientError::Api(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ChatError> for ClientError {
    fn from(err: ChatError) -> Self {
        ClientError::Api(err)
    }
}
