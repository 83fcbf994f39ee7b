//! Core domain errors.
//!
//! Every failure that reaches a client carries a machine-readable
//! `kind:surface` code plus a human message.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing parameters, or mutually exclusive arguments.
    BadRequest,
    /// Request body failed structural validation.
    InvalidData,
    /// No caller identity.
    Unauthorized,
    /// Caller identity present but not the resource owner.
    Forbidden,
    /// Resource absent.
    NotFound,
    /// Entitlement check failed.
    QuotaExceeded,
    /// External producer refused the request.
    RateLimited,
    /// External producer or persistence unavailable.
    Offline,
}

impl ErrorKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::InvalidData => "invalid_data",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::NotFound => "not_found",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Offline => "offline",
        }
    }

    /// HTTP status code this kind maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest | ErrorKind::InvalidData => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::QuotaExceeded | ErrorKind::RateLimited => 429,
            ErrorKind::Offline => 503,
        }
    }
}

/// Where it went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Api,
    Auth,
    Chat,
    Document,
    History,
    Stream,
}

impl Surface {
    /// Wire name of this surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Api => "api",
            Surface::Auth => "auth",
            Surface::Chat => "chat",
            Surface::Document => "document",
            Surface::History => "history",
            Surface::Stream => "stream",
        }
    }
}

/// Error raised by any Parley operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatError {
    pub kind: ErrorKind,
    pub surface: Surface,
    /// Optional detail, e.g. which parameter was missing.
    pub cause: Option<String>,
}

impl ChatError {
    pub fn new(kind: ErrorKind, surface: Surface) -> Self {
        Self {
            kind,
            surface,
            cause: None,
        }
    }

    /// Attach a detail message.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn bad_request(surface: Surface, cause: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, surface).with_cause(cause)
    }

    pub fn invalid_data(cause: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidData, Surface::Api).with_cause(cause)
    }

    pub fn unauthorized(surface: Surface) -> Self {
        Self::new(ErrorKind::Unauthorized, surface)
    }

    pub fn forbidden(surface: Surface) -> Self {
        Self::new(ErrorKind::Forbidden, surface)
    }

    pub fn not_found(surface: Surface) -> Self {
        Self::new(ErrorKind::NotFound, surface)
    }

    pub fn offline(surface: Surface, cause: impl Into<String>) -> Self {
        Self::new(ErrorKind::Offline, surface).with_cause(cause)
    }

    /// Machine-readable `kind:surface` code.
    pub fn code(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.surface.as_str())
    }

    /// Human-readable message for this error.
    pub fn message(&self) -> &'static str {
        match (self.kind, self.surface) {
            (ErrorKind::BadRequest, _) => {
                "The request couldn't be processed. Please check your input and try again."
            }
            (ErrorKind::InvalidData, _) => "The request body is malformed.",
            (ErrorKind::Unauthorized, Surface::Auth) => "You need to sign in to continue.",
            (ErrorKind::Unauthorized, _) => "You need to sign in before continuing.",
            (ErrorKind::Forbidden, Surface::Chat) => {
                "This chat belongs to another user. Please check the chat ID and try again."
            }
            (ErrorKind::Forbidden, Surface::Document) => {
                "This document belongs to another user. Please check the document ID and try again."
            }
            (ErrorKind::Forbidden, _) => "You don't have access to this resource.",
            (ErrorKind::NotFound, Surface::Chat) => {
                "The requested chat was not found. Please check the chat ID and try again."
            }
            (ErrorKind::NotFound, Surface::Document) => {
                "The requested document was not found. Please check the document ID and try again."
            }
            (ErrorKind::NotFound, _) => "The requested resource was not found.",
            (ErrorKind::QuotaExceeded, _) => {
                "You have exceeded your maximum number of messages for the day. Please try again later."
            }
            (ErrorKind::RateLimited, _) => "The model provider is busy. Please try again later.",
            (ErrorKind::Offline, _) => {
                "We're having trouble reaching the backend. Please try again later."
            }
        }
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {} ({})", self.code(), self.message(), cause),
            None => write!(f, "{}: {}", self.code(), self.message()),
        }
    }
}

impl std::error::Error for ChatError {}

/// JSON body of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl From<&ChatError> for ErrorBody {
    fn from(err: &ChatError) -> Self {
        Self {
            code: err.code(),
            message: err.message().to_string(),
            cause: err.cause.clone(),
        }
    }
}

impl ErrorBody {
    /// Rebuild the typed error from a wire body. Unknown codes become `offline:api`.
    pub fn into_error(self) -> ChatError {
        let (kind, surface) = self.code.split_once(':').unwrap_or((self.code.as_str(), "api"));
        let kind = serde_json::from_value(serde_json::Value::String(kind.to_string()))
            .unwrap_or(ErrorKind::Offline);
        let surface = serde_json::from_value(serde_json::Value::String(surface.to_string()))
            .unwrap_or(Surface::Api);
        ChatError {
            kind,
            surface,
            cause: self.cause,
        }
    }
}

/// Core domain errors that are not request failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A user type has no entitlement entry.
    #[error("No entitlements configured for user type: {0}")]
    MissingEntitlement(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
