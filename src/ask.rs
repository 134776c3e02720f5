//! Conversational retrieval: question → embedding → top-k chunks →
//! one generation call.
//!
//! The chat history is supplied by the caller on every call and is never
//! stored or modified here. Asking about a repository that has no index
//! is a usage error ([`AskError::NotIngested`]), as is asking with an
//! embedding configuration different from the one the index was built
//! with.

use std::time::{Duration, Instant};

use crate::error::AskError;
use crate::generation::GenerationRequest;
use crate::models::{ConversationTurn, RetrievedChunk};
use crate::pipeline::RepoChat;
use crate::repo_id::RepoId;

impl RepoChat {
    /// Answer `question` about `repo` under the configured timeout.
    pub async fn ask(
        &self,
        repo: &RepoId,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<String, AskError> {
        let timeout = Duration::from_secs(self.config.retrieval.timeout_secs);
        self.ask_with_timeout(repo, question, history, timeout).await
    }

    /// Like [`ask`](Self::ask) with a caller-supplied timeout covering
    /// embedding, retrieval, and generation.
    pub async fn ask_with_timeout(
        &self,
        repo: &RepoId,
        question: &str,
        history: &[ConversationTurn],
        timeout: Duration,
    ) -> Result<String, AskError> {
        match tokio::time::timeout(timeout, self.answer(repo, question, history)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(repo = %repo, timeout_secs = timeout.as_secs_f32(), "ask timed out");
                Err(AskError::Timeout(timeout))
            }
        }
    }

    /// The `top_k` chunks most similar to `question`.
    pub async fn retrieve(
        &self,
        repo: &RepoId,
        question: &str,
    ) -> Result<Vec<RetrievedChunk>, AskError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AskError::EmptyQuestion);
        }

        let manifest = self
            .store
            .manifest(repo)
            .await
            .map_err(AskError::Storage)?
            .ok_or_else(|| AskError::NotIngested(repo.clone()))?;

        let current = self.embedder.fingerprint();
        if manifest.fingerprint != current {
            return Err(AskError::EmbeddingMismatch {
                indexed: manifest.fingerprint,
                current,
            });
        }

        let vector = self
            .embedder
            .embed_query(question)
            .await
            .map_err(AskError::Embedding)?;

        self.store
            .query(repo, &vector, self.config.retrieval.top_k)
            .await
            .map_err(AskError::Storage)
    }

    async fn answer(
        &self,
        repo: &RepoId,
        question: &str,
        history: &[ConversationTurn],
    ) -> Result<String, AskError> {
        let start = Instant::now();
        let context = self.retrieve(repo, question).await?;
        tracing::debug!(
            repo = %repo,
            retrieved = context.len(),
            history = history.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "retrieved context"
        );

        let request = GenerationRequest {
            question: question.trim(),
            context: &context,
            history,
        };
        let answer = self
            .generator
            .generate(&request)
            .await
            .map_err(AskError::Generation)?;

        tracing::debug!(
            repo = %repo,
            generator = self.generator.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "answered"
        );
        Ok(answer)
    }
}
