//! Error taxonomy for the indexing and session pipelines.
//!
//! Per-file scan problems are recoverable and collected as [`ScanWarning`]s;
//! everything else in [`IndexError`] aborts the operation that hit it. The
//! distinction matters for the sync pass: a single unreadable file must not
//! block indexing of the rest of the project, but an embedding or store
//! failure must leave the previous manifest authoritative.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Embedding failed; the sync pass aborts and the prior manifest stands.
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    /// The vector index backend is unreachable or rejected an operation.
    /// Fatal for the current command; nothing is partially committed.
    #[error("vector store unavailable: {0}")]
    VectorStoreUnavailable(String),

    /// Another sync pass or live session holds the manifest lock.
    #[error("index is locked by another process: {0}")]
    Locked(String),

    /// The manifest file could not be read, parsed, or atomically replaced.
    #[error("manifest error: {0}")]
    Manifest(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    /// Intent classification failed; callers fall back to a code search.
    #[error("intent classification failed: {0}")]
    ClassificationFailure(String),

    /// Generation failed mid-turn; the turn is surfaced as an error and not
    /// appended to the buffer.
    #[error("generation failed: {0}")]
    GenerationFailure(String),
}

/// A recoverable per-file problem observed during scanning.
///
/// Collected and reported in aggregate at the end of a pass rather than
/// aborting it.
#[derive(Debug, Clone)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub reason: String,
}

impl std::fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}
