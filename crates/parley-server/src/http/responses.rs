//! HTTP request and response types.

use serde::{Deserialize, Serialize};

use parley_core::Visibility;

// ============================================================================
// Document types
// ============================================================================

/// Query for `/document`.
#[derive(Debug, Default, Deserialize)]
pub struct DocumentQuery {
    pub id: Option<String>,

    /// RFC 3339 cutoff for rollback.
    pub timestamp: Option<String>,
}

/// Body of `POST /document`. Fields are optional so that missing ones can be
/// reported as `bad_request` instead of a generic rejection.
#[derive(Debug, Default, Deserialize)]
pub struct SaveDocumentRequest {
    pub content: Option<String>,
    pub title: Option<String>,
    pub kind: Option<String>,
}

// ============================================================================
// History types
// ============================================================================

/// Query for `GET /history`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<String>,
    pub starting_after: Option<String>,
    pub ending_before: Option<String>,
}

// ============================================================================
// Chat types
// ============================================================================

/// `?id=` query used by chat and message deletion.
#[derive(Debug, Default, Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

/// Body of `PATCH /chat/:id/visibility`.
#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub visibility: Visibility,
}

// ============================================================================
// Common types
// ============================================================================

/// Result of a bulk deletion.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedCountResponse {
    pub deleted_count: usize,
}
