//! Core data models used throughout docrag.
//!
//! These types represent the uploaded documents, the chunks (nodes) produced
//! by ingestion, and the citation records attached to generated answers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One uploaded file living in the managed data directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDocument {
    /// Stable stored basename (UUID-prefixed, unique in the data dir).
    pub filename: String,
    /// Name of the file as the user uploaded it.
    pub original_filename: String,
    /// Lowercased extension without the dot (`pdf`, `docx`, `txt`, `md`).
    pub extension: String,
    pub file_size: u64,
    /// SHA-256 of the raw bytes, hex encoded.
    pub content_hash: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A retrievable unit of text belonging to exactly one source file.
///
/// Chunks are immutable once created. Re-ingesting a file replaces its
/// whole chunk list; chunks are never merged.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Deterministic id derived from file, page, position and text.
    pub id: String,
    /// Display filename (basename) of the owning document.
    pub file_name: String,
    /// Path the chunk was produced from.
    pub file_path: String,
    /// 1-based page label, PDFs only.
    pub page_label: Option<String>,
    /// Ordinal position within the page (PDF) or document (other formats).
    pub chunk_index: u32,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    /// Vector from the embedding capability, if the chunk has been embedded.
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn is_embedded(&self) -> bool {
        self.embedding.is_some()
    }
}

/// A retrieved chunk plus its retrieval score, considered for citation.
#[derive(Debug, Clone)]
pub struct CitationCandidate {
    pub chunk: Chunk,
    pub score: f64,
}

/// A citation attached to a final answer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Citation {
    /// Excerpt of the chunk text (presentational only).
    pub text: String,
    pub filename: String,
    pub page: Option<String>,
    /// Raw retrieval score of the cited chunk.
    pub score: f64,
    /// Number of answer content-words found in the chunk.
    pub alignment: usize,
    pub combined_score: f64,
}
