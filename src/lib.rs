//! # repochat
//!
//! Ask questions about a GitHub repository and get answers grounded in
//! its source.
//!
//! A repository is cloned, walked, split into overlapping chunks, embedded,
//! and stored in an index of its own. Questions are embedded with the same
//! provider, matched against that index, and answered by a generation
//! model that sees the retrieved chunks and the conversation so far.
//!
//! ## Architecture
//!
//! ```text
//!  URL ──▶ materialize ──▶ loader ──▶ chunk ──▶ embedding ──▶ index
//!                                                               │
//!  question + history ──▶ embedding ──▶ index.query ──▶ generation ──▶ answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! repochat ingest https://github.com/octocat/Hello-World
//! repochat ask octocat_hello-world "What does this repository do?"
//! repochat serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`repo_id`] | Repository identifiers derived from URLs |
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`loader`] | Directory walk into text documents |
//! | [`chunk`] | Recursive character text splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generation`] | Answer generation providers |
//! | [`index`] | Per-repository vector index |
//! | [`pipeline`] | The `RepoChat` engine |
//! | [`ingest`] | Ingestion pipeline |
//! | [`ask`] | Conversational retrieval pipeline |
//! | [`materialize`] | Cloning, file trees, file reads |
//! | [`server`] | HTTP API |
//! | [`error`] | Caller-facing error taxonomy |

pub mod ask;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod materialize;
pub mod models;
pub mod pipeline;
pub mod repo_id;
mod retry;
pub mod server;

pub use error::{AskError, FailureKind, IngestError};
pub use ingest::{IngestOutcome, ProcessedRepo};
pub use pipeline::RepoChat;
pub use repo_id::RepoId;
