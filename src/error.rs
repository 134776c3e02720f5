//! Error taxonomy for the caller-facing operations.
//!
//! Everything below the pipelines returns `anyhow::Result`. The pipelines
//! are the boundary where those errors are classified into the typed
//! enums here, so a caller can tell "your repository/question is invalid"
//! apart from "a dependency is unavailable" and decide whether to retry.

use std::time::Duration;

use crate::embedding::EmbeddingFingerprint;
use crate::repo_id::RepoId;

/// Coarse classification of a failure, used by frontends to pick a
/// status code and by callers to decide whether retrying makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request itself is invalid. Retrying it unchanged will fail again.
    Usage,
    /// An embedding, generation, or storage dependency failed.
    Dependency,
    /// The call ran out of time while waiting on a dependency.
    Timeout,
}

impl FailureKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureKind::Usage)
    }
}

/// Errors from deriving or validating a [`RepoId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoIdError {
    #[error("Invalid GitHub URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid repository identifier: {0}")]
    InvalidId(String),
}

impl RepoIdError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::Usage
    }
}

/// Errors raised inside the ingestion pipeline.
///
/// These never escape [`RepoChat::ingest`](crate::pipeline::RepoChat::ingest);
/// they are folded into an [`IngestOutcome`](crate::ingest::IngestOutcome).
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("No valid text files found in the repository.")]
    NoDocuments,

    #[error("No indexable text found in the repository.")]
    NoChunks,

    #[error("Error during ingestion: failed to read repository: {0:#}")]
    Loader(anyhow::Error),

    #[error("Error during ingestion: {0:#}")]
    Embedding(anyhow::Error),

    #[error("Error during ingestion: {0:#}")]
    Storage(anyhow::Error),
}

impl IngestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::NoDocuments | IngestError::NoChunks => FailureKind::Usage,
            IngestError::Loader(_) | IngestError::Embedding(_) | IngestError::Storage(_) => {
                FailureKind::Dependency
            }
        }
    }
}

/// Errors from [`RepoChat::ask`](crate::pipeline::RepoChat::ask).
#[derive(Debug, thiserror::Error)]
pub enum AskError {
    #[error("Question must not be empty.")]
    EmptyQuestion,

    #[error("Repository '{0}' has not been processed yet.")]
    NotIngested(RepoId),

    #[error(
        "Repository was indexed with {indexed} but the current embedding provider is {current}; re-process the repository."
    )]
    EmbeddingMismatch {
        indexed: EmbeddingFingerprint,
        current: EmbeddingFingerprint,
    },

    #[error("Embedding provider failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("Index lookup failed: {0:#}")]
    Storage(anyhow::Error),

    #[error("Answer generation failed: {0:#}")]
    Generation(anyhow::Error),

    #[error("Timed out after {}s waiting for an answer.", .0.as_secs_f32())]
    Timeout(Duration),
}

impl AskError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AskError::EmptyQuestion
            | AskError::NotIngested(_)
            | AskError::EmbeddingMismatch { .. } => FailureKind::Usage,
            AskError::Embedding(_) | AskError::Storage(_) | AskError::Generation(_) => {
                FailureKind::Dependency
            }
            AskError::Timeout(_) => FailureKind::Timeout,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_errors_not_retryable() {
        let id = RepoId::parse("octocat_hello-world").unwrap();
        assert!(!AskError::NotIngested(id).is_retryable());
        assert!(!AskError::EmptyQuestion.is_retryable());
        assert_eq!(IngestError::NoDocuments.kind(), FailureKind::Usage);
    }

    #[test]
    fn test_dependency_errors_retryable() {
        let err = AskError::Generation(anyhow::anyhow!("429 rate limited"));
        assert_eq!(err.kind(), FailureKind::Dependency);
        assert!(err.is_retryable());
        assert_eq!(
            AskError::Timeout(Duration::from_secs(3)).kind(),
            FailureKind::Timeout
        );
    }

    #[test]
    fn test_no_documents_message() {
        assert_eq!(
            IngestError::NoDocuments.to_string(),
            "No valid text files found in the repository."
        );
    }
}
