//! SQLite persistence for repos, files, and chunks.
//!
//! Ownership is exclusive and cascading: deleting a repo removes its
//! files, and deleting a file removes its chunks (`ON DELETE CASCADE`).
//! The indexing pipeline is the only writer of `index_status` and
//! `indexed_at`; the answering pipeline reads chunks read-only.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use crate::models::{Chunk, IndexStatus, Repo};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS repos (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    owner          TEXT NOT NULL,
    name           TEXT NOT NULL,
    full_name      TEXT NOT NULL UNIQUE,
    clone_url      TEXT NOT NULL,
    default_branch TEXT NOT NULL,
    index_status   TEXT NOT NULL,
    indexed_at     TEXT
);

CREATE TABLE IF NOT EXISTS files (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
    path    TEXT NOT NULL,
    size    INTEGER
);

CREATE TABLE IF NOT EXISTS chunks (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id    INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    start_line INTEGER NOT NULL,
    end_line   INTEGER NOT NULL,
    content    TEXT NOT NULL,
    embedding  BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_repo_id ON files(repo_id);
CREATE INDEX IF NOT EXISTS idx_chunks_file_id ON chunks(file_id);
"#;

/// Database handle. Cheap to clone; wraps a connection pool.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (creating if necessary) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {url}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to open database")?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to apply schema")?;

        Ok(Self { pool })
    }

    /// In-memory database for tests. A single pinned connection: with a
    /// larger pool every connection would see its own empty database.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to apply schema")?;

        Ok(Self { pool })
    }

    // ─── Repos ───────────────────────────────────────────

    /// Insert a new repo with status=pending. Fails if `full_name` is taken.
    pub async fn create_repo(
        &self,
        owner: &str,
        name: &str,
        clone_url: &str,
        default_branch: &str,
    ) -> Result<Repo> {
        let full_name = format!("{owner}/{name}");
        let result = sqlx::query(
            "INSERT INTO repos (owner, name, full_name, clone_url, default_branch, index_status)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(owner)
        .bind(name)
        .bind(&full_name)
        .bind(clone_url)
        .bind(default_branch)
        .bind(IndexStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert repo {full_name}"))?;

        let id = result.last_insert_rowid();
        self.get_repo(id)
            .await?
            .context("Inserted repo not found")
    }

    pub async fn get_repo(&self, id: i64) -> Result<Option<Repo>> {
        let row = sqlx::query("SELECT * FROM repos WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(repo_from_row).transpose()
    }

    pub async fn get_repo_by_full_name(&self, full_name: &str) -> Result<Option<Repo>> {
        let row = sqlx::query("SELECT * FROM repos WHERE full_name = ?")
            .bind(full_name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(repo_from_row).transpose()
    }

    pub async fn list_repos(&self) -> Result<Vec<Repo>> {
        let rows = sqlx::query("SELECT * FROM repos ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(repo_from_row).collect()
    }

    /// Update a repo's index status, and `indexed_at` when provided.
    pub async fn update_index_status(
        &self,
        id: i64,
        status: IndexStatus,
        indexed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match indexed_at {
            Some(ts) => {
                sqlx::query("UPDATE repos SET index_status = ?, indexed_at = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(ts.to_rfc3339())
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
            None => {
                sqlx::query("UPDATE repos SET index_status = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Delete a repo and (via cascade) all of its files and chunks.
    /// Returns false if the repo did not exist.
    pub async fn delete_repo(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM repos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ─── Files ───────────────────────────────────────────

    pub async fn insert_file(&self, repo_id: i64, path: &str, size: Option<i64>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO files (repo_id, path, size) VALUES (?, ?, ?)")
            .bind(repo_id)
            .bind(path)
            .bind(size)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert file {path}"))?;
        Ok(result.last_insert_rowid())
    }

    /// All file paths recorded for a repo, in insertion order.
    pub async fn file_paths(&self, repo_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT path FROM files WHERE repo_id = ? ORDER BY id")
            .bind(repo_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("path")).collect())
    }

    pub async fn file_count(&self, repo_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM files WHERE repo_id = ?")
            .bind(repo_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    // ─── Chunks ──────────────────────────────────────────

    pub async fn insert_chunk(
        &self,
        file_id: i64,
        start_line: i64,
        end_line: i64,
        content: &str,
        embedding: &[f32],
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO chunks (file_id, start_line, end_line, content, embedding)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(file_id)
        .bind(start_line)
        .bind(end_line)
        .bind(content)
        .bind(embedding_to_blob(embedding))
        .execute(&self.pool)
        .await
        .context("Failed to insert chunk")?;
        Ok(result.last_insert_rowid())
    }

    /// All chunks belonging to a repo (joined through files), in insertion
    /// order, with a limit. This is the answering pipeline's read path.
    pub async fn chunks_for_repo(&self, repo_id: i64, limit: Option<i64>) -> Result<Vec<Chunk>> {
        let sql = match limit {
            Some(_) => {
                "SELECT c.* FROM chunks c JOIN files f ON c.file_id = f.id
                 WHERE f.repo_id = ? ORDER BY c.id LIMIT ?"
            }
            None => {
                "SELECT c.* FROM chunks c JOIN files f ON c.file_id = f.id
                 WHERE f.repo_id = ? ORDER BY c.id"
            }
        };

        let mut query = sqlx::query(sql).bind(repo_id);
        if let Some(n) = limit {
            query = query.bind(n);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(chunk_from_row).collect())
    }

    pub async fn chunk_count(&self, repo_id: i64) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM chunks c JOIN files f ON c.file_id = f.id
             WHERE f.repo_id = ?",
        )
        .bind(repo_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }
}

fn repo_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Repo> {
    let status_str: String = row.get("index_status");
    let index_status = IndexStatus::parse(&status_str)
        .with_context(|| format!("Unknown index_status in database: {status_str}"))?;
    let indexed_at: Option<String> = row.get("indexed_at");
    let indexed_at = indexed_at
        .as_deref()
        .map(DateTime::parse_from_rfc3339)
        .transpose()
        .context("Invalid indexed_at timestamp")?
        .map(|dt| dt.with_timezone(&Utc));

    Ok(Repo {
        id: row.get("id"),
        owner: row.get("owner"),
        name: row.get("name"),
        full_name: row.get("full_name"),
        clone_url: row.get("clone_url"),
        default_branch: row.get("default_branch"),
        index_status,
        indexed_at,
    })
}

fn chunk_from_row(row: sqlx::sqlite::SqliteRow) -> Chunk {
    let blob: Vec<u8> = row.get("embedding");
    Chunk {
        id: row.get("id"),
        file_id: row.get("file_id"),
        start_line: row.get("start_line"),
        end_line: row.get("end_line"),
        content: row.get("content"),
        embedding: embedding_from_blob(&blob),
    }
}

/// Encode an embedding as little-endian f32 bytes for BLOB storage.
pub fn embedding_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into an embedding vector.
pub fn embedding_from_blob(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
