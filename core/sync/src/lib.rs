//! Report export orchestration.
//!
//! This module ties the pieces of one export action together:
//! - Report bundles are laid out by the aggregator into one document
//! - Documents and files are written through an [`ExportTarget`]
//! - Every artifact gets its own entry in the resulting [`ExportReport`]

pub mod engine;
pub mod state;

pub use engine::{ExportConfig, ExportEngine, ExportTarget, FileArtifact, FileSource};
pub use state::{Artifact, ArtifactEntry, ArtifactStatus, ExportReport};
