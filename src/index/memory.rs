//! In-memory [`IndexStore`] for tests and ephemeral deployments.
//!
//! Each repository's entries are an immutable snapshot behind an `Arc`;
//! `replace` swaps the snapshot under a write lock so readers always hold
//! one complete generation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;

use super::{rank, IndexManifest, IndexStore};
use crate::models::{IndexEntry, RetrievedChunk};
use crate::repo_id::RepoId;

struct Snapshot {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

pub struct MemoryIndexStore {
    repos: RwLock<HashMap<RepoId, Arc<Snapshot>>>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self {
            repos: RwLock::new(HashMap::new()),
        }
    }

    fn snapshot(&self, repo: &RepoId) -> Result<Option<Arc<Snapshot>>> {
        let repos = self
            .repos
            .read()
            .map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
        Ok(repos.get(repo).cloned())
    }
}

impl Default for MemoryIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexStore for MemoryIndexStore {
    async fn replace(&self, manifest: &IndexManifest, entries: Vec<IndexEntry>) -> Result<()> {
        let snapshot = Arc::new(Snapshot {
            manifest: manifest.clone(),
            entries,
        });
        let mut repos = self
            .repos
            .write()
            .map_err(|_| anyhow::anyhow!("index lock poisoned"))?;
        repos.insert(manifest.repo_id.clone(), snapshot);
        Ok(())
    }

    async fn manifest(&self, repo: &RepoId) -> Result<Option<IndexManifest>> {
        Ok(self.snapshot(repo)?.map(|s| s.manifest.clone()))
    }

    async fn query(
        &self,
        repo: &RepoId,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let Some(snapshot) = self.snapshot(repo)? else {
            return Ok(Vec::new());
        };
        Ok(rank(
            snapshot.entries.iter().map(|e| {
                (
                    e.chunk.source_path.as_str(),
                    e.chunk.chunk_index,
                    e.chunk.text.as_str(),
                    e.vector.as_slice(),
                )
            }),
            vector,
            k,
        ))
    }

    async fn close(&self, _repo: &RepoId) -> Result<()> {
        Ok(())
    }

    async fn close_all(&self) -> Result<()> {
        Ok(())
    }
}
