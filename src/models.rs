//! Core data models used throughout docsense.
//!
//! These types represent the documents, pages, chunks, and query results that
//! flow through the ingestion and retrieval pipeline. `Page` is ephemeral
//! (extraction/chunking only); everything else is either persisted or derived
//! per query.

use serde::{Deserialize, Serialize};

/// How a document's text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Native text extraction for every page.
    Text,
    /// OCR for every page.
    Ocr,
    /// Some pages native, some OCR'd.
    Mixed,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Text => "text",
            ExtractionMethod::Ocr => "ocr",
            ExtractionMethod::Mixed => "mixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ExtractionMethod::Text),
            "ocr" => Some(ExtractionMethod::Ocr),
            "mixed" => Some(ExtractionMethod::Mixed),
            _ => None,
        }
    }
}

/// Ingestion lifecycle state. Transitions only move forward:
/// `uploaded → extracting → chunking → embedding → indexed`, with `failed`
/// reachable from any non-terminal state. No state is re-entrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Extracting,
    Chunking,
    Embedding,
    Indexed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Extracting => "extracting",
            DocumentStatus::Chunking => "chunking",
            DocumentStatus::Embedding => "embedding",
            DocumentStatus::Indexed => "indexed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(DocumentStatus::Uploaded),
            "extracting" => Some(DocumentStatus::Extracting),
            "chunking" => Some(DocumentStatus::Chunking),
            "embedding" => Some(DocumentStatus::Embedding),
            "indexed" => Some(DocumentStatus::Indexed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }

    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Indexed | DocumentStatus::Failed)
    }
}

/// File type declared at upload, derived from the filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Pdf,
    PlainText,
    Image,
}

impl FileType {
    /// Map a filename to its declared type. Unrecognized extensions are not
    /// an error here; the extractor rejects them as `UnsupportedFormat`.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit('.').next()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileType::Pdf),
            "txt" | "md" => Some(FileType::PlainText),
            "png" | "jpg" | "jpeg" | "tiff" => Some(FileType::Image),
            _ => None,
        }
    }
}

/// Document metadata persisted in SQLite. Owned exclusively by the ingestion
/// state machine; deletion cascades to chunks, tables, and index entries.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub status: DocumentStatus,
    /// Stable human-readable reason, set only when `status == Failed`.
    pub failure_reason: Option<String>,
    pub extraction_method: Option<ExtractionMethod>,
    pub page_count: i64,
    pub chunk_count: i64,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

/// One page of extracted text. Ephemeral: exists only between extraction and
/// chunking, never persisted on its own.
#[derive(Debug, Clone)]
pub struct Page {
    /// Zero-based page index within the document.
    pub index: i64,
    pub text: String,
    pub method: ExtractionMethod,
    pub has_table: bool,
}

/// A bounded, page-scoped span of document text; the atomic retrieval unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// Globally unique, deterministic: `"{document_id}:{index:06}"`.
    pub id: String,
    pub document_id: String,
    pub page_index: i64,
    pub text: String,
    pub char_count: i64,
}

/// A table detected on a page, stored row-major.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub id: String,
    pub document_id: String,
    pub page_index: i64,
    pub rows: Vec<Vec<String>>,
}

/// A chunk plus its similarity score and provenance, computed per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub page_index: i64,
    pub snippet: String,
    pub score: f64,
}

/// A claimed link from the answer to a supporting chunk. Validated against
/// the evidence set before leaving the query path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub claim_text: String,
}

/// The validated response to a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    /// Always within [0, 1].
    pub confidence: f64,
    pub citations: Vec<Citation>,
    /// Ordered by score descending, ties broken by ascending chunk_id.
    pub evidence: Vec<Evidence>,
}

/// Truncate a chunk's text into a display/evidence snippet.
pub fn snippet_of(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_from_extension() {
        assert_eq!(FileType::from_filename("report.pdf"), Some(FileType::Pdf));
        assert_eq!(
            FileType::from_filename("notes.MD"),
            Some(FileType::PlainText)
        );
        assert_eq!(FileType::from_filename("scan.JPEG"), Some(FileType::Image));
        assert_eq!(FileType::from_filename("archive.zip"), None);
        assert_eq!(FileType::from_filename("noextension"), None);
    }

    #[test]
    fn status_round_trip() {
        for s in [
            DocumentStatus::Uploaded,
            DocumentStatus::Extracting,
            DocumentStatus::Chunking,
            DocumentStatus::Embedding,
            DocumentStatus::Indexed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(DocumentStatus::parse("bogus"), None);
    }

    #[test]
    fn terminal_states() {
        assert!(DocumentStatus::Indexed.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
        assert!(!DocumentStatus::Embedding.is_terminal());
    }

    #[test]
    fn snippet_truncation() {
        assert_eq!(snippet_of("short", 240), "short");
        let long = "x".repeat(300);
        let s = snippet_of(&long, 240);
        assert_eq!(s.chars().count(), 243);
        assert!(s.ends_with("..."));
    }
}
