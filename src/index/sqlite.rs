//! SQLite-backed [`IndexStore`]: one database file per repository.
//!
//! Layout: `{root}/{repo_id}/index.sqlite`, WAL mode. Connection pools are
//! opened lazily and cached per repository until [`IndexStore::close`].
//! Looking up a repository that was never ingested does not create
//! anything on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::sync::Mutex;

use super::{rank, IndexManifest, IndexStore};
use crate::embedding::{blob_to_vec, vec_to_blob, EmbeddingFingerprint};
use crate::models::{IndexEntry, RetrievedChunk};
use crate::repo_id::RepoId;

const DB_FILE: &str = "index.sqlite";

pub struct SqliteIndexStore {
    root: PathBuf,
    pools: Mutex<HashMap<RepoId, SqlitePool>>,
}

impl SqliteIndexStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding one repository's index.
    pub fn repo_dir(&self, repo: &RepoId) -> PathBuf {
        self.root.join(repo.as_str())
    }

    /// Whether a pool for `repo` is currently cached.
    pub async fn is_open(&self, repo: &RepoId) -> bool {
        self.pools.lock().await.contains_key(repo)
    }

    async fn pool(&self, repo: &RepoId, create: bool) -> Result<Option<SqlitePool>> {
        if let Some(pool) = self.pools.lock().await.get(repo) {
            return Ok(Some(pool.clone()));
        }

        // Connect without holding the registry lock; a concurrent opener
        // of the same repository may win, in which case its pool is kept.
        let dir = self.repo_dir(repo);
        let db_path = dir.join(DB_FILE);
        if !create && !db_path.exists() {
            return Ok(None);
        }
        std::fs::create_dir_all(&dir)?;

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        migrate(&pool).await?;

        let mut pools = self.pools.lock().await;
        if let Some(existing) = pools.get(repo) {
            let existing = existing.clone();
            drop(pools);
            pool.close().await;
            return Ok(Some(existing));
        }
        pools.insert(repo.clone(), pool.clone());
        tracing::debug!(repo = %repo, path = %db_path.display(), "opened index");
        Ok(Some(pool))
    }
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS manifest (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            repo_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            file_count INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL,
            ingested_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_path TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            vector BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait]
impl IndexStore for SqliteIndexStore {
    async fn replace(&self, manifest: &IndexManifest, entries: Vec<IndexEntry>) -> Result<()> {
        let Some(pool) = self.pool(&manifest.repo_id, true).await? else {
            anyhow::bail!("failed to open index for {}", manifest.repo_id);
        };

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM manifest").execute(&mut *tx).await?;

        for entry in &entries {
            sqlx::query(
                "INSERT INTO chunks (source_path, chunk_index, text, hash, vector) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&entry.chunk.source_path)
            .bind(entry.chunk.chunk_index)
            .bind(&entry.chunk.text)
            .bind(&entry.chunk.hash)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO manifest \
             (id, repo_id, provider, model, dims, file_count, chunk_count, ingested_at) \
             VALUES (1, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(manifest.repo_id.as_str())
        .bind(&manifest.fingerprint.provider)
        .bind(&manifest.fingerprint.model)
        .bind(manifest.fingerprint.dims as i64)
        .bind(manifest.file_count as i64)
        .bind(manifest.chunk_count as i64)
        .bind(manifest.ingested_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn manifest(&self, repo: &RepoId) -> Result<Option<IndexManifest>> {
        let Some(pool) = self.pool(repo, false).await? else {
            return Ok(None);
        };

        let row = sqlx::query(
            "SELECT provider, model, dims, file_count, chunk_count, ingested_at \
             FROM manifest WHERE id = 1",
        )
        .fetch_optional(&pool)
        .await?;

        Ok(row.map(|row| {
            let dims: i64 = row.get("dims");
            let file_count: i64 = row.get("file_count");
            let chunk_count: i64 = row.get("chunk_count");
            IndexManifest {
                repo_id: repo.clone(),
                fingerprint: EmbeddingFingerprint {
                    provider: row.get("provider"),
                    model: row.get("model"),
                    dims: dims as usize,
                },
                file_count: file_count as usize,
                chunk_count: chunk_count as usize,
                ingested_at: row.get("ingested_at"),
            }
        }))
    }

    async fn query(
        &self,
        repo: &RepoId,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let Some(pool) = self.pool(repo, false).await? else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            "SELECT source_path, chunk_index, text, vector FROM chunks ORDER BY id",
        )
        .fetch_all(&pool)
        .await?;

        let candidates: Vec<(String, i64, String, Vec<f32>)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("vector");
                (
                    row.get("source_path"),
                    row.get("chunk_index"),
                    row.get("text"),
                    blob_to_vec(&blob),
                )
            })
            .collect();

        Ok(rank(
            candidates
                .iter()
                .map(|(p, i, t, v)| (p.as_str(), *i, t.as_str(), v.as_slice())),
            vector,
            k,
        ))
    }

    async fn close(&self, repo: &RepoId) -> Result<()> {
        let pool = self.pools.lock().await.remove(repo);
        if let Some(pool) = pool {
            pool.close().await;
            tracing::debug!(repo = %repo, "closed index");
        }
        Ok(())
    }

    async fn close_all(&self) -> Result<()> {
        let pools: Vec<SqlitePool> = self.pools.lock().await.drain().map(|(_, p)| p).collect();
        for pool in pools {
            pool.close().await;
        }
        Ok(())
    }
}
