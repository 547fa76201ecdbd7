//! Indexing pipeline: clone → select → chunk → embed → persist.
//!
//! Drives a repo through `pending → indexing → {complete, error}`. The
//! pipeline is the sole writer of `index_status` and `indexed_at`. Failure
//! policy: clone and enumeration errors are fatal to the run; a file that
//! cannot be read keeps its File row and produces no chunks; a failed
//! embedding batch is logged, dropped, and the run continues. Rows written
//! before a fatal error are not rolled back.

pub mod chunker;
pub mod selector;

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;

use crate::git::SourceFetcher;
use crate::llm::LlmClient;
use crate::models::{IndexStatus, Repo};
use crate::store::Db;

/// Characters per fragment.
pub const CHUNK_SIZE: usize = 1000;

/// Fragments per embedding request.
pub const EMBED_BATCH_SIZE: usize = 64;

/// Run one indexing pass for `repo`. Sets status=indexing up front (visible
/// to pollers before the clone starts), then complete or error at the end.
/// The clone workspace is a temp dir removed on every exit path.
pub async fn index_repo(
    db: &Db,
    llm: Arc<dyn LlmClient>,
    fetcher: Arc<dyn SourceFetcher>,
    repo: &Repo,
) -> Result<()> {
    db.update_index_status(repo.id, IndexStatus::Indexing, None)
        .await?;

    match run(db, llm, fetcher, repo).await {
        Ok(stats) => {
            db.update_index_status(repo.id, IndexStatus::Complete, Some(Utc::now()))
                .await?;
            tracing::info!(
                "Indexed {}: {} files, {} chunks ({} embedding batches skipped)",
                repo.full_name,
                stats.files,
                stats.chunks,
                stats.skipped_batches
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Indexing failed for {}: {e:#}", repo.full_name);
            if let Err(update_err) = db
                .update_index_status(repo.id, IndexStatus::Error, None)
                .await
            {
                tracing::error!(
                    "Could not record error status for {}: {update_err:#}",
                    repo.full_name
                );
            }
            Err(e)
        }
    }
}

struct RunStats {
    files: usize,
    chunks: usize,
    skipped_batches: usize,
}

async fn run(
    db: &Db,
    llm: Arc<dyn LlmClient>,
    fetcher: Arc<dyn SourceFetcher>,
    repo: &Repo,
) -> Result<RunStats> {
    // Temp workspace; Drop removes it on success and failure alike.
    let workspace = tempfile::tempdir().context("Failed to create clone workspace")?;
    let workspace_path = workspace.path().to_path_buf();

    let url = repo.clone_url.clone();
    let clone_dest = workspace_path.clone();
    let snapshot = tokio::task::spawn_blocking(move || fetcher.shallow_clone(&url, &clone_dest))
        .await
        .context("Clone task panicked")??;

    tracing::info!(
        "Cloned {} @ {}: {} paths at HEAD",
        repo.full_name,
        &snapshot.head[..7.min(snapshot.head.len())],
        snapshot.paths.len()
    );

    // Select and record files, collecting fragments for embedding.
    let mut stats = RunStats {
        files: 0,
        chunks: 0,
        skipped_batches: 0,
    };
    let mut pending: Vec<(i64, chunker::Fragment)> = Vec::new();

    for path in snapshot.paths.iter().filter(|p| selector::should_index(p)) {
        let abs = workspace_path.join(path);
        let size = std::fs::metadata(&abs).ok().map(|m| m.len() as i64);
        let file_id = db.insert_file(repo.id, path, size).await?;
        stats.files += 1;

        // A path listed at HEAD can still be unreadable in the workspace
        // (deleted, non-UTF-8). Keep the File row, skip its chunks.
        let content = match std::fs::read_to_string(&abs) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Skipping content of {path}: {e}");
                continue;
            }
        };

        for fragment in chunker::chunk(&content, CHUNK_SIZE) {
            pending.push((file_id, fragment));
        }
    }

    // Embed in fixed-size batches; a failed batch drops its fragments and
    // the run carries on.
    for batch in pending.chunks(EMBED_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|(_, f)| f.text.clone()).collect();
        let embeddings = match llm.embed_batch(&texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                tracing::warn!(
                    "Embedding batch of {} fragments failed for {}: {e:#}",
                    batch.len(),
                    repo.full_name
                );
                stats.skipped_batches += 1;
                continue;
            }
        };

        for ((file_id, fragment), embedding) in batch.iter().zip(embeddings) {
            let (start_line, end_line) = chunker::line_span(fragment.index, CHUNK_SIZE);
            db.insert_chunk(*file_id, start_line, end_line, &fragment.text, &embedding)
                .await?;
            stats.chunks += 1;
        }
    }

    Ok(stats)
}
