//! Core data models used throughout repochat.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and question-answering pipelines.

use serde::{Deserialize, Serialize};

/// A readable text file from a repository checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the repository root, `/`-separated.
    pub source_path: String,
    pub text: String,
}

/// A bounded span of a document's text; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_path: String,
    /// Position within the parent document, contiguous from 0.
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk paired with its embedding vector, ready for the index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A chunk returned from a nearest-neighbour query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub source_path: String,
    pub chunk_index: i64,
    pub text: String,
    /// Cosine similarity against the query vector.
    pub score: f32,
}

/// One prior exchange in a conversation. The caller owns the history and
/// passes all of it on every question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

impl From<(String, String)> for ConversationTurn {
    fn from((question, answer): (String, String)) -> Self {
        Self { question, answer }
    }
}

/// Counts describing one successful ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Distinct source files represented in the stored chunks.
    pub files: usize,
    /// Chunks stored in the index.
    pub chunks: usize,
    /// Readable text files discovered before the document cap.
    pub files_discovered: usize,
    /// Chunks produced before the chunk cap.
    pub chunks_produced: usize,
    /// Files skipped because they were unreadable or binary.
    pub files_skipped: usize,
    pub documents_truncated: bool,
    pub chunks_truncated: bool,
}
