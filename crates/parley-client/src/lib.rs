//! Client library for Parley.
//!
//! Provides the HTTP client plus the scoped stores a chat view is built on:
//! the data stream, the artifact store, optimistic visibility and the resume
//! coordinator.

pub mod artifact;
pub mod data_stream;
pub mod error;
pub mod http;
pub mod resume;
pub mod sse;
pub mod visibility;

pub use artifact::{Artifact, ArtifactStatus, ArtifactStore};
pub use data_stream::DataStream;
pub use error::ClientError;
pub use http::{HttpClient, Identity};
pub use resume::{ResumeCoordinator, ResumeState, StreamResumer};
pub use sse::PartStream;
pub use visibility::{ChatVisibility, UpdatePhase, VisibilityApi, VisibilityUpdate};
