//! Versioned documents (artifacts).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{DocumentId, UserId};

/// What kind of content a document holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    #[default]
    Text,
    Code,
    Image,
    Sheet,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Text => "text",
            ArtifactKind::Code => "code",
            ArtifactKind::Image => "image",
            ArtifactKind::Sheet => "sheet",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ArtifactKind::Text),
            "code" => Ok(ArtifactKind::Code),
            "image" => Ok(ArtifactKind::Image),
            "sheet" => Ok(ArtifactKind::Sheet),
            other => Err(format!("unknown artifact kind: {}", other)),
        }
    }
}

/// One saved state of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVersion {
    /// Position in the append order, starting at 1. Never reused after rollback.
    pub sequence: u64,
    pub title: String,
    pub content: String,
    pub kind: ArtifactKind,
    pub created_at: DateTime<Utc>,
}

/// A document with its full version history.
///
/// `versions` is never empty and strictly increasing in `created_at`;
/// the last element is the current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: UserId,
    pub kind: ArtifactKind,
    pub versions: Vec<DocumentVersion>,
}

impl Document {
    /// Create a document from its first version.
    pub fn new(id: DocumentId, owner_id: UserId, first: DocumentVersion) -> Self {
        Self {
            id,
            owner_id,
            kind: first.kind,
            versions: vec![first],
        }
    }

    /// The current version.
    pub fn current(&self) -> &DocumentVersion {
        // versions is non-empty by construction
        &self.versions[self.versions.len() - 1]
    }

    /// Timestamp and sequence the next appended version must exceed.
    pub fn last_stamp(&self) -> (DateTime<Utc>, u64) {
        let current = self.current();
        (current.created_at, current.sequence)
    }

    /// Append a version. Returns false and leaves the document untouched if
    /// the version would break the ordering invariant.
    pub fn push_version(&mut self, version: DocumentVersion) -> bool {
        let (last_at, last_seq) = self.last_stamp();
        if version.created_at <= last_at || version.sequence <= last_seq {
            return false;
        }
        self.kind = version.kind;
        self.versions.push(version);
        true
    }

    /// Remove every version created strictly after `cutoff`, always keeping
    /// the first version. Returns how many versions were removed.
    pub fn truncate_after(&mut self, cutoff: DateTime<Utc>) -> usize {
        let keep = self
            .versions
            .iter()
            .take_while(|v| v.created_at <= cutoff)
            .count()
            .max(1);
        let removed = self.versions.len() - keep;
        self.versions.truncate(keep);
        self.kind = self.current().kind;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn version(seq: u64, content: &str, at: DateTime<Utc>) -> DocumentVersion {
        DocumentVersion {
            sequence: seq,
            title: "Doc".to_string(),
            content: content.to_string(),
            kind: ArtifactKind::Text,
            created_at: at,
        }
    }

    fn three_versions() -> (Document, DateTime<Utc>) {
        let t0 = Utc::now();
        let mut doc = Document::new(DocumentId::new("d1"), UserId::generate(), version(1, "A", t0));
        assert!(doc.push_version(version(2, "B", t0 + Duration::milliseconds(1))));
        assert!(doc.push_version(version(3, "C", t0 + Duration::milliseconds(2))));
        (doc, t0)
    }

    #[test]
    fn test_push_rejects_non_increasing_timestamp() {
        let (mut doc, t0) = three_versions();
        assert!(!doc.push_version(version(4, "D", t0)));
        assert_eq!(doc.versions.len(), 3);
        assert_eq!(doc.current().content, "C");
    }

    #[test]
    fn test_truncate_after_removes_later_versions() {
        let (mut doc, t0) = three_versions();
        assert_eq!(doc.truncate_after(t0), 2);
        assert_eq!(doc.versions.len(), 1);
        assert_eq!(doc.current().content, "A");
        // idempotent
        assert_eq!(doc.truncate_after(t0), 0);
    }

    #[test]
    fn test_truncate_before_first_keeps_first_version() {
        let (mut doc, t0) = three_versions();
        let removed = doc.truncate_after(t0 - Duration::seconds(10));
        assert_eq!(removed, 2);
        assert_eq!(doc.versions.len(), 1);
        assert_eq!(doc.current().content, "A");
    }

    #[test]
    fn test_artifact_kind_parse() {
        assert_eq!("code".parse::<ArtifactKind>(), Ok(ArtifactKind::Code));
        assert!("video".parse::<ArtifactKind>().is_err());
    }
}
