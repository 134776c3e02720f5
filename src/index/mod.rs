//! Per-repository vector index.
//!
//! Every repository's chunks live in their own namespace keyed by
//! [`RepoId`]; no operation on one repository can observe or modify
//! another's entries. Two backends implement [`IndexStore`]:
//!
//! - [`SqliteIndexStore`]: one SQLite database per repository under
//!   `{index.dir}/{repo_id}/index.sqlite`, persisted across restarts.
//! - [`MemoryIndexStore`]: process-local maps, for tests and ephemeral
//!   deployments.
//!
//! Ingestion always calls [`IndexStore::replace`], which swaps the whole
//! repository's contents atomically: a concurrent query sees either the
//! previous entries or the new ones, never a mix.

mod memory;
mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{IndexBackend, IndexConfig};
use crate::embedding::{cosine_similarity, EmbeddingFingerprint};
use crate::models::{IndexEntry, RetrievedChunk};
use crate::repo_id::RepoId;

pub use memory::MemoryIndexStore;
pub use sqlite::SqliteIndexStore;

/// Metadata recorded alongside a repository's entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub repo_id: RepoId,
    /// The embedding space every stored vector belongs to.
    pub fingerprint: EmbeddingFingerprint,
    pub file_count: usize,
    pub chunk_count: usize,
    /// Unix timestamp (seconds).
    pub ingested_at: i64,
}

#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Atomically replace everything stored for `manifest.repo_id`.
    async fn replace(&self, manifest: &IndexManifest, entries: Vec<IndexEntry>) -> Result<()>;

    /// `None` when the repository has never been ingested.
    async fn manifest(&self, repo: &RepoId) -> Result<Option<IndexManifest>>;

    /// The `k` entries most similar to `vector`, best first. Ties keep
    /// insertion order. Empty for unknown repositories.
    async fn query(&self, repo: &RepoId, vector: &[f32], k: usize)
        -> Result<Vec<RetrievedChunk>>;

    /// Release any handles held for `repo`. Stored data is kept and the
    /// next call reopens it.
    async fn close(&self, repo: &RepoId) -> Result<()>;

    /// Release every handle.
    async fn close_all(&self) -> Result<()>;
}

/// Open the backend selected by `[index] backend`.
pub fn open_store(config: &IndexConfig) -> Arc<dyn IndexStore> {
    match config.backend {
        IndexBackend::Sqlite => Arc::new(SqliteIndexStore::new(&config.dir)),
        IndexBackend::Memory => Arc::new(MemoryIndexStore::new()),
    }
}

/// Brute-force cosine ranking shared by both backends.
fn rank<'a, I>(candidates: I, query: &[f32], k: usize) -> Vec<RetrievedChunk>
where
    I: IntoIterator<Item = (&'a str, i64, &'a str, &'a [f32])>,
{
    let mut scored: Vec<RetrievedChunk> = candidates
        .into_iter()
        .map(|(source_path, chunk_index, text, vector)| RetrievedChunk {
            source_path: source_path.to_string(),
            chunk_index,
            text: text.to_string(),
            score: cosine_similarity(query, vector),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_orders_and_truncates() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let c = [0.7f32, 0.7];
        let ranked = rank(
            vec![
                ("a.rs", 0, "a", &a[..]),
                ("b.rs", 0, "b", &b[..]),
                ("c.rs", 0, "c", &c[..]),
            ],
            &[1.0, 0.0],
            2,
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].source_path, "a.rs");
        assert_eq!(ranked[1].source_path, "c.rs");
    }

    #[test]
    fn test_rank_ties_keep_insertion_order() {
        let v = [1.0f32, 0.0];
        let ranked = rank(
            vec![("x.rs", 0, "x", &v[..]), ("y.rs", 0, "y", &v[..])],
            &[1.0, 0.0],
            2,
        );
        assert_eq!(ranked[0].source_path, "x.rs");
        assert_eq!(ranked[1].source_path, "y.rs");
    }
}
