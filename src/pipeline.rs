//! The `RepoChat` engine.
//!
//! Owns everything both pipelines share: configuration, the single
//! [`Embedder`], the [`Generator`], the [`IndexStore`], and a table of
//! per-repository locks that serializes ingestion of the same repository.
//! The ingestion and question pipelines themselves live in
//! [`ingest`](crate::ingest) and [`ask`](crate::ask).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::OwnedMutexGuard;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::generation::{create_generator, DisabledGenerator, Generator};
use crate::index::{open_store, IndexStore};
use crate::repo_id::RepoId;

pub struct RepoChat {
    pub(crate) config: Config,
    pub(crate) embedder: Embedder,
    pub(crate) generator: Arc<dyn Generator>,
    pub(crate) store: Arc<dyn IndexStore>,
    locks: Mutex<HashMap<RepoId, Arc<tokio::sync::Mutex<()>>>>,
}

impl RepoChat {
    /// Build an engine from configuration.
    ///
    /// The embedding provider is fixed here for the engine's lifetime, so
    /// ingestion and querying always embed through the same
    /// configuration. A generation provider that cannot be built (for
    /// example, a missing API key) leaves ingestion usable; `ask` then
    /// fails with the reason.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let embedder = Embedder::from_config(&config.embedding)?;
        let generator = match create_generator(&config.generation) {
            Ok(generator) => generator,
            Err(e) => {
                tracing::warn!("answer generation unavailable: {:#}", e);
                Arc::new(DisabledGenerator::new(format!("{:#}", e))) as Arc<dyn Generator>
            }
        };
        let store = open_store(&config.index);
        Ok(Self::new(config, embedder, generator, store))
    }

    pub fn new(
        config: Config,
        embedder: Embedder,
        generator: Arc<dyn Generator>,
        store: Arc<dyn IndexStore>,
    ) -> Self {
        Self {
            config,
            embedder,
            generator,
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    /// The ingestion lock for one repository.
    pub(crate) fn repo_lock(&self, repo: &RepoId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(repo.clone()).or_default().clone()
    }

    /// Wait for exclusive ownership of `repo`'s checkout and index.
    pub(crate) async fn lock_repo(&self, repo: &RepoId) -> RepoGuard<'_> {
        let guard = self.repo_lock(repo).lock_owned().await;
        RepoGuard {
            chat: self,
            repo: repo.clone(),
            guard: Some(guard),
        }
    }

    /// Release every index handle.
    pub async fn shutdown(&self) -> Result<()> {
        self.store.close_all().await
    }

    #[cfg(test)]
    pub(crate) fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Held while one repository is being materialized or ingested. On drop
/// the lock-table entry is removed unless another task is waiting on it.
pub(crate) struct RepoGuard<'a> {
    chat: &'a RepoChat,
    repo: RepoId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RepoGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.chat.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&self.repo)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.repo);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexBackend;

    fn engine() -> RepoChat {
        let mut config = Config::default();
        config.embedding.provider = "hash".to_string();
        config.generation.provider = "disabled".to_string();
        config.index.backend = IndexBackend::Memory;
        RepoChat::from_config(config).unwrap()
    }

    #[test]
    fn test_same_repo_shares_lock() {
        let chat = engine();
        let a = RepoId::parse("acme_one").unwrap();
        let b = RepoId::parse("acme_two").unwrap();
        assert!(Arc::ptr_eq(&chat.repo_lock(&a), &chat.repo_lock(&a)));
        assert!(!Arc::ptr_eq(&chat.repo_lock(&a), &chat.repo_lock(&b)));
    }

    #[tokio::test]
    async fn test_lock_entry_released_after_use() {
        let chat = engine();
        let a = RepoId::parse("acme_one").unwrap();

        let guard = chat.lock_repo(&a).await;
        assert_eq!(chat.lock_count(), 1);
        drop(guard);
        assert_eq!(chat.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_lock_entry_kept_while_another_task_waits() {
        let chat = engine();
        let a = RepoId::parse("acme_one").unwrap();

        let guard = chat.lock_repo(&a).await;
        let waiting = chat.repo_lock(&a);
        drop(guard);
        assert_eq!(chat.lock_count(), 1);

        let again = chat.lock_repo(&a).await;
        assert!(Arc::ptr_eq(&waiting, &chat.repo_lock(&a)));
        drop(waiting);
        drop(again);
        assert_eq!(chat.lock_count(), 0);
    }

    #[cfg(feature = "local-embeddings-fastembed")]
    #[test]
    fn test_default_config_builds_engine() {
        let chat = RepoChat::from_config(Config::default()).unwrap();
        let fingerprint = chat.embedder().fingerprint();
        assert_eq!(fingerprint.provider, "local");
        assert_eq!(fingerprint.dims, 384);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.embedding.provider = "hash".to_string();
        config.loader.exclude_globs = vec!["src/[a".to_string()];
        assert!(RepoChat::from_config(config).is_err());
    }

    #[test]
    fn test_embedder_bound_from_config() {
        let chat = engine();
        assert_eq!(chat.embedder().fingerprint().provider, "hash");
        assert_eq!(chat.embedder().fingerprint().dims, 384);
    }
}
