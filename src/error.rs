//! Error taxonomy shared by ingestion, indexing and generation.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, RagError>;

/// Failures surfaced by the RAG pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// A single uploaded file could not be read; batch callers skip it.
    #[error("failed to extract text from {file}: {reason}")]
    Extraction {
        /// Original upload filename.
        file: String,
        /// Human-readable cause.
        reason: String,
    },

    /// The caller supplied arguments the operation cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Search or retrieval was attempted before an index exists.
    #[error("no vector index available; create or load one first")]
    NotReady,

    /// The language model cannot be reached without an API key.
    #[error("{variable} is not configured")]
    MissingCredential {
        /// Environment variable that should hold the key.
        variable: &'static str,
    },

    /// The embedding backend failed.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Retrieval or generation failed during a turn.
    #[error("generation failed: {0}")]
    Generation(String),

    /// A persisted index is unreadable or inconsistent.
    #[error("persisted index at {path:?} is unusable: {reason}")]
    Persistence {
        /// Path that was being read or written.
        path: PathBuf,
        /// Human-readable cause.
        reason: String,
    },

    /// Underlying filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure for manifests or chunk records.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RagError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
