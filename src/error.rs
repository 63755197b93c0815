//! Error taxonomy for the ingestion and query pipelines.
//!
//! Ingestion-side errors (`ExtractionError`, `ChunkingError`, `EmbeddingError`,
//! `IndexError`) are terminal for the affected document: the document moves to
//! `failed` with the error's display string as the retained reason, and no
//! other in-flight document is affected. Query-side errors (`ReasoningError`,
//! `ValidationError`) are recovered locally and never fail a request outright.

use thiserror::Error;

/// Failure while turning raw bytes into pages.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("corrupt input: {0}")]
    CorruptInput(String),
    #[error("OCR failed: {0}")]
    OcrFailure(String),
}

/// Failure while splitting pages into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Extraction produced pages, but none carried any usable text.
    #[error("degenerate input: no extractable text in any page")]
    DegenerateInput,
}

/// Failure in the external embedding capability.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding capability unavailable: {0}")]
    CapabilityUnavailable(String),
}

/// Failure in the durable vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index persistence failed: {0}")]
    PersistenceFailure(String),
}

impl From<sqlx::Error> for IndexError {
    fn from(e: sqlx::Error) -> Self {
        IndexError::PersistenceFailure(e.to_string())
    }
}

/// Failure in the generation layer. Always recoverable: the query falls back
/// to extractive answering.
#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("LLM call timed out after {0}s")]
    Timeout(u64),
    #[error("LLM output could not be parsed: {0}")]
    MalformedOutput(String),
    #[error("LLM capability unavailable: {0}")]
    CapabilityUnavailable(String),
}

/// Failure while validating the outgoing response shape. A defensive fault:
/// logged and converted into a minimal safe result, never client-visible.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("response schema mismatch: {0}")]
    SchemaMismatch(String),
}

/// Any error that terminates ingestion of a single document.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("metadata store failure: {0}")]
    Store(String),
}

impl From<sqlx::Error> for IngestError {
    fn from(e: sqlx::Error) -> Self {
        IngestError::Store(e.to_string())
    }
}
