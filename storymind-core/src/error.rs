//! Error taxonomy for the character extraction pipeline.
//!
//! Each variant corresponds to a failure kind a caller can match on to decide
//! whether a failure is fatal to the current operation, isolated to a single
//! character, or silently absorbed (see the propagation policy each variant
//! documents). Library-internal helpers that merely wrap an opaque lower-level
//! error (SQLite, I/O, HTTP transport) fall back to the `Other` variant via
//! `anyhow::Error`'s `From` impl rather than inventing a new taxonomy entry.

use thiserror::Error;

/// Errors surfaced by the C1–C8 pipeline components.
#[derive(Debug, Error)]
pub enum StoryMindError {
    /// Raised by the document loader when a file extension isn't recognized.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// Raised by the document loader when a recognized format fails to parse.
    #[error("failed to load document: {0}")]
    DocumentLoadFailed(String),

    /// Raised when the embedding model cannot be loaded or initialized.
    #[error("embedding model unavailable: {0}")]
    EmbeddingModelUnavailable(String),

    /// Raised when a persisted embedding index is missing a sidecar file,
    /// has mismatched lengths, or was built under a different embedding model.
    #[error("embedding index corrupt: {0}")]
    IndexCorrupt(String),

    /// Raised when the name extractor's LLM response isn't a parseable JSON array.
    #[error("failed to parse name extraction response: {0}")]
    ExtractionParseError(String),

    /// Raised by any LLM-calling component when the provider reports a quota error.
    #[error("LLM provider quota exceeded")]
    LlmQuotaExceeded,

    /// Raised by any LLM-calling component on a transport-level failure.
    #[error("LLM provider transport error: {0}")]
    LlmTransient(String),

    /// Raised by the profile synthesizer when retrieval returns no usable windows.
    #[error("no retrievable context for character")]
    RetrievalEmpty,

    /// Raised by the orchestrator when a metadata store operation fails mid-ingest.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Catch-all for errors from lower-level libraries (I/O, SQLite, HTTP)
    /// that don't correspond to a named taxonomy entry.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoryMindError {
    fn from(err: rusqlite::Error) -> Self {
        StoryMindError::PersistenceError(err.to_string())
    }
}

impl From<std::io::Error> for StoryMindError {
    fn from(err: std::io::Error) -> Self {
        StoryMindError::DocumentLoadFailed(err.to_string())
    }
}

/// Errors from the external text-to-image provider (C7).
///
/// Per the spec's propagation policy, none of these ever abort the pipeline:
/// the image generator catches them and falls back to a deterministic
/// placeholder. The enum exists so that fallback decision can match on
/// a closed, inspectable set of causes instead of a free-text string.
#[derive(Debug, Error)]
pub enum ImageProviderError {
    /// The provider returned a structured "no image" / refusal response.
    #[error("image provider refused the request")]
    Refusal,

    /// The provider reported a quota or rate-limit error.
    #[error("image provider quota exceeded")]
    QuotaExceeded,

    /// The provider's safety filter rejected the prompt or output.
    #[error("image provider content filter triggered")]
    ContentFiltered,

    /// A network or transport-level failure talking to the provider.
    #[error("image provider transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, StoryMindError>;
