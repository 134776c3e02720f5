//! Recursive character text splitter.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size`
//! characters, carrying up to `chunk_overlap` characters of trailing
//! context from one chunk into the next.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from `["\n\n", "\n", " ", ""]` that occurs
//!    in the text (`""` always matches and splits into characters).
//! 2. Split on it, keeping each separator attached to the start of the
//!    piece that follows, so no text is lost.
//! 3. Merge consecutive pieces shorter than `chunk_size` into chunks,
//!    flushing when the next piece would overflow. After a flush, pieces
//!    are dropped from the front of the buffer until at most
//!    `chunk_overlap` characters remain; those become the start of the
//!    next chunk.
//! 4. Pieces that are themselves too long are split recursively with the
//!    remaining separators.
//! 5. Each chunk is whitespace-trimmed; empty chunks are dropped.
//!
//! Lengths are counted in characters, never bytes, so multi-byte text is
//! never cut inside a code point.
//!
//! ```rust
//! use repochat::chunk::TextSplitter;
//! use repochat::models::Document;
//!
//! let splitter = TextSplitter::new(800, 100);
//! let doc = Document { source_path: "a.txt".into(), text: "hello world".into() };
//! let chunks = splitter.split_document(&doc);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "hello world");
//! ```

use sha2::{Digest, Sha256};
use std::collections::VecDeque;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document};

const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split every document, preserving document order.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| self.split_document(doc))
            .collect()
    }

    pub fn split_document(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| make_chunk(&document.source_path, i as i64, text))
            .collect()
    }

    /// Split raw text into chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);
        let pieces = split_keep_separator(text, separator);

        let mut chunks = Vec::new();
        let mut good: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge(&good));
                good.clear();
            }
            if remaining.is_empty() {
                if let Some(trimmed) = non_empty_trimmed(piece) {
                    chunks.push(trimmed);
                }
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge(&good));
        }

        chunks
    }

    /// Greedily pack small pieces into chunks with trailing overlap.
    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size && !window.is_empty() {
                if let Some(chunk) = join_window(&window) {
                    chunks.push(chunk);
                }
                while total > self.chunk_overlap
                    || (total + len > self.chunk_size && total > 0)
                {
                    match window.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }
            window.push_back((piece, len));
            total += len;
        }

        if let Some(chunk) = join_window(&window) {
            chunks.push(chunk);
        }
        chunks
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

fn pick_separator<'a>(text: &str, separators: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    for (i, &sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return (sep, &[]);
        }
        if text.contains(sep) {
            return (sep, &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Split so that each separator occurrence begins a new piece.
fn split_keep_separator<'t>(text: &'t str, separator: &str) -> Vec<&'t str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn join_window(window: &VecDeque<(&str, usize)>) -> Option<String> {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    non_empty_trimmed(&joined)
}

fn non_empty_trimmed(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(source_path: &str, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        source_path: source_path.to_string(),
        chunk_index: index,
        text,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            source_path: "src/lib.rs".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = TextSplitter::default().split_document(&doc("hello world"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].source_path, "src/lib.rs");
    }

    #[test]
    fn test_empty_and_whitespace_produce_nothing() {
        let splitter = TextSplitter::default();
        assert!(splitter.split_document(&doc("")).is_empty());
        assert!(splitter.split_document(&doc(" \n\n\t \n")).is_empty());
    }

    #[test]
    fn test_chunks_respect_max_size() {
        let text = (0..400)
            .map(|i| format!("token{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = TextSplitter::new(100, 20).split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 100, "chunk too long: {}", c.len());
        }
    }

    #[test]
    fn test_exact_overlap_without_separators() {
        let text: String = "abcdefghij".repeat(30);
        let chunks = TextSplitter::new(100, 10).split_text(&text);
        assert!(chunks.len() >= 3);
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            assert_eq!(prev.len(), 100);
            let tail: String = prev[prev.len() - 10..].iter().collect();
            let head: String = next[..10].iter().collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_word_overlap_carries_context() {
        let text = (0..200)
            .map(|i| format!("w{:03}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = TextSplitter::new(80, 20).split_text(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let first_next = pair[1].split_whitespace().next().unwrap();
            let prev_tail: String = {
                let chars: Vec<char> = pair[0].chars().collect();
                chars[chars.len().saturating_sub(20)..].iter().collect()
            };
            assert!(
                prev_tail.contains(first_next),
                "{:?} not in tail {:?}",
                first_next,
                prev_tail
            );
        }
    }

    #[test]
    fn test_paragraphs_preferred() {
        let para_a = "a".repeat(60);
        let para_b = "b".repeat(60);
        let text = format!("{}\n\n{}", para_a, para_b);
        let chunks = TextSplitter::new(100, 10).split_text(&text);
        assert_eq!(chunks, vec![para_a, para_b]);
    }

    #[test]
    fn test_deterministic() {
        let text = "fn main() {\n    println!(\"hi\");\n}\n\n".repeat(80);
        let splitter = TextSplitter::new(120, 30);
        let a = splitter.split_document(&doc(&text));
        let b = splitter.split_document(&doc(&text));
        assert_eq!(a, b);
        for (i, c) in a.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn test_multibyte_counted_as_chars() {
        let text = "┌──┐".repeat(50);
        let chunks = TextSplitter::new(40, 5).split_text(&text);
        for c in &chunks {
            assert!(c.chars().count() <= 40);
        }
        assert_eq!(chunks[0].chars().count(), 40);
    }

    #[test]
    fn test_split_documents_keeps_provenance() {
        let docs = vec![
            Document {
                source_path: "a.rs".into(),
                text: "alpha".into(),
            },
            Document {
                source_path: "b.rs".into(),
                text: "beta".into(),
            },
        ];
        let chunks = TextSplitter::default().split_documents(&docs);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].source_path, "a.rs");
        assert_eq!(chunks[1].source_path, "b.rs");
        assert_eq!(chunks[1].chunk_index, 0);
    }

    #[test]
    fn test_hash_is_sha256_of_text() {
        let chunks = TextSplitter::default().split_document(&doc("hello world"));
        assert_eq!(
            chunks[0].hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
