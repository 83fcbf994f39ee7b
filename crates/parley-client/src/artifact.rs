//! Client-side view of the document being generated alongside a reply.

use tokio::sync::watch;

use parley_core::{ArtifactKind, StreamPart};

/// Whether the artifact is still receiving content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArtifactStatus {
    #[default]
    Idle,
    Streaming,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    pub document_id: Option<String>,
    pub title: String,
    pub kind: ArtifactKind,
    pub content: String,
    pub status: ArtifactStatus,
}

impl Artifact {
    /// Apply one part. Returns false when the part does not concern artifacts.
    pub fn apply(&mut self, part: &StreamPart) -> bool {
        match part {
            StreamPart::DataId { data } => {
                self.document_id = Some(data.clone());
                self.status = ArtifactStatus::Streaming;
            }
            StreamPart::DataTitle { data } => {
                self.title = data.clone();
                self.status = ArtifactStatus::Streaming;
            }
            StreamPart::DataKind { data } => {
                self.kind = *data;
                self.status = ArtifactStatus::Streaming;
            }
            StreamPart::DataClear => {
                self.content.clear();
                self.status = ArtifactStatus::Streaming;
            }
            StreamPart::DataTextDelta { data } => {
                self.content.push_str(data);
                self.status = ArtifactStatus::Streaming;
            }
            StreamPart::DataFinish => self.status = ArtifactStatus::Idle,
            _ => return false,
        }
        true
    }
}

/// Scoped artifact store. One writer applies parts, readers subscribe.
#[derive(Debug)]
pub struct ArtifactStore {
    tx: watch::Sender<Artifact>,
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Artifact::default());
        Self { tx }
    }

    pub fn apply(&self, part: &StreamPart) -> bool {
        self.tx.send_if_modified(|artifact| artifact.apply(part))
    }

    /// Apply every part in order, e.g. a [`crate::DataStream`] snapshot.
    pub fn apply_all<'a>(&self, parts: impl IntoIterator<Item = &'a StreamPart>) {
        for part in parts {
            self.apply(part);
        }
    }

    pub fn current(&self) -> Artifact {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Artifact> {
        self.tx.subscribe()
    }

    pub fn reset(&self) {
        self.tx.send_replace(Artifact::default());
    }
}
