//! Ingestion pipeline: loader → chunker → embedder → index.
//!
//! [`RepoChat::ingest`] never returns an error. Every failure, including
//! embedding and storage outages, is converted into an [`IngestOutcome`]
//! with `success == false`, a readable message, and a [`FailureKind`]
//! telling the caller whether retrying can help.
//!
//! Document and chunk caps bound the cost of very large repositories.
//! Truncation is not a failure: ingestion proceeds and says so in the
//! message.
//!
//! [`RepoChat::process_repository`] runs clone, ingest and listing as one
//! unit under the repository's lock, so concurrent requests for the same
//! repository never see each other's half-written checkout.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::chunk::TextSplitter;
use crate::config::IngestConfig;
use crate::error::{FailureKind, IngestError};
use crate::index::IndexManifest;
use crate::loader::load_documents;
use crate::materialize::{clone_checkout, file_tree, CloneError, FileNode};
use crate::models::{IndexEntry, IngestReport};
use crate::pipeline::RepoChat;
use crate::repo_id::RepoId;

/// Caller-facing result of one ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IngestReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl IngestOutcome {
    fn succeeded(report: IngestReport, config: &IngestConfig) -> Self {
        Self {
            success: true,
            message: summary(&report, config),
            report: Some(report),
            failure: None,
        }
    }

    fn failed(error: &IngestError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            report: None,
            failure: Some(error.kind()),
        }
    }
}

/// A repository cloned, indexed and listed under one lock.
#[derive(Debug, Clone)]
pub struct ProcessedRepo {
    pub id: RepoId,
    pub path: PathBuf,
    pub outcome: IngestOutcome,
    /// Empty when ingestion failed.
    pub file_tree: Vec<FileNode>,
}

impl RepoChat {
    /// Index the checkout at `root` under `repo`, replacing any previous
    /// index for it.
    ///
    /// Ingestion of one repository is serialized; different repositories
    /// ingest concurrently.
    pub async fn ingest(&self, root: &Path, repo: &RepoId) -> IngestOutcome {
        let _guard = self.lock_repo(repo).await;
        self.ingest_locked(root, repo).await
    }

    /// Clone `url` into its checkout directory, index it, and list it.
    ///
    /// A clone failure is returned as an error; an ingestion failure is
    /// reported in [`ProcessedRepo::outcome`].
    pub async fn process_repository(&self, url: &str) -> Result<ProcessedRepo, CloneError> {
        let id = RepoId::from_url(url)?;
        let repos = &self.config.repos;
        let target = &id;
        self.process_with(&id, move || async move {
            clone_checkout(target, repos).await.map(|repo| repo.path)
        })
        .await
    }

    /// Run `materialize`, ingestion and listing for `repo` while holding
    /// its lock.
    pub(crate) async fn process_with<F, Fut>(
        &self,
        repo: &RepoId,
        materialize: F,
    ) -> Result<ProcessedRepo, CloneError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PathBuf, CloneError>>,
    {
        let _guard = self.lock_repo(repo).await;
        let path = materialize().await?;
        let outcome = self.ingest_locked(&path, repo).await;

        let file_tree = if outcome.success {
            let root = path.clone();
            tokio::task::spawn_blocking(move || file_tree(&root))
                .await
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(ProcessedRepo {
            id: repo.clone(),
            path,
            outcome,
            file_tree,
        })
    }

    async fn ingest_locked(&self, root: &Path, repo: &RepoId) -> IngestOutcome {
        let start = Instant::now();
        match self.build_index(root, repo).await {
            Ok(report) => {
                tracing::info!(
                    repo = %repo,
                    files = report.files,
                    chunks = report.chunks,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "ingestion complete"
                );
                IngestOutcome::succeeded(report, &self.config.ingest)
            }
            Err(e) => {
                tracing::warn!(repo = %repo, kind = ?e.kind(), "ingestion failed: {}", e);
                IngestOutcome::failed(&e)
            }
        }
    }

    async fn build_index(&self, root: &Path, repo: &RepoId) -> Result<IngestReport, IngestError> {
        let caps = &self.config.ingest;

        let walk_root = root.to_path_buf();
        let loader_config = self.config.loader.clone();
        let loaded = tokio::task::spawn_blocking(move || load_documents(&walk_root, &loader_config))
            .await
            .map_err(|e| IngestError::Loader(e.into()))?
            .map_err(IngestError::Loader)?;

        if loaded.documents.is_empty() {
            return Err(IngestError::NoDocuments);
        }

        let mut documents = loaded.documents;
        let files_discovered = documents.len();
        if files_discovered > caps.max_documents {
            tracing::warn!(
                repo = %repo,
                discovered = files_discovered,
                cap = caps.max_documents,
                "document cap reached; truncating"
            );
            documents.truncate(caps.max_documents);
        }

        let splitter = TextSplitter::from_config(&self.config.chunking);
        let mut chunks = splitter.split_documents(&documents);
        let chunks_produced = chunks.len();
        if chunks_produced > caps.max_chunks {
            tracing::warn!(
                repo = %repo,
                produced = chunks_produced,
                cap = caps.max_chunks,
                "chunk cap reached; truncating"
            );
            chunks.truncate(caps.max_chunks);
        }
        if chunks.is_empty() {
            return Err(IngestError::NoChunks);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_texts(&texts)
            .await
            .map_err(IngestError::Embedding)?;

        let files = chunks
            .iter()
            .map(|c| c.source_path.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        let report = IngestReport {
            files,
            chunks: chunks.len(),
            files_discovered,
            chunks_produced,
            files_skipped: loaded.skipped,
            documents_truncated: files_discovered > caps.max_documents,
            chunks_truncated: chunks_produced > caps.max_chunks,
        };

        let manifest = IndexManifest {
            repo_id: repo.clone(),
            fingerprint: self.embedder.fingerprint(),
            file_count: report.files,
            chunk_count: report.chunks,
            ingested_at: chrono::Utc::now().timestamp(),
        };
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();

        self.store
            .replace(&manifest, entries)
            .await
            .map_err(IngestError::Storage)?;

        Ok(report)
    }
}

/// Render the success message for a report.
pub fn summary(report: &IngestReport, config: &IngestConfig) -> String {
    let mut message = format!(
        "Successfully processed {} chunks from {} files.",
        report.chunks, report.files
    );
    if report.documents_truncated {
        message.push_str(&format!(
            " Repository has {} files; only the first {} were processed.",
            report.files_discovered, config.max_documents
        ));
    }
    if report.chunks_truncated {
        message.push_str(&format!(
            " Limited to the first {} of {} chunks.",
            config.max_chunks, report.chunks_produced
        ));
    }
    if report.files_skipped > 0 {
        message.push_str(&format!(
            " Skipped {} unreadable or binary files.",
            report.files_skipped
        ));
    }
    message
}
