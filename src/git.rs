//! Shallow-clone support and HEAD blob enumeration.
//!
//! The [`SourceFetcher`] trait is the seam between the indexing pipeline
//! and git: production code uses [`GitFetcher`] (libgit2), tests inject
//! fakes that stage files on disk or fail outright.

use anyhow::{Context, Result};
use std::path::Path;

/// Result of a shallow clone: the HEAD revision plus every blob path
/// reachable from its tree.
#[derive(Debug, Clone)]
pub struct CloneSnapshot {
    pub head: String,
    pub paths: Vec<String>,
}

/// Clones a repository into a destination directory.
pub trait SourceFetcher: Send + Sync {
    /// Shallow-clone `url` into `dest` (history depth 1) and enumerate
    /// the blob paths at HEAD.
    fn shallow_clone(&self, url: &str, dest: &Path) -> Result<CloneSnapshot>;
}

/// Production [`SourceFetcher`] backed by libgit2.
pub struct GitFetcher;

impl SourceFetcher for GitFetcher {
    fn shallow_clone(&self, url: &str, dest: &Path) -> Result<CloneSnapshot> {
        tracing::info!("Cloning {} into {} (depth 1)", url, dest.display());

        let mut fetch_options = git2::FetchOptions::new();
        fetch_options.depth(1);

        let repo = git2::build::RepoBuilder::new()
            .fetch_options(fetch_options)
            .clone(url, dest)
            .with_context(|| format!("Failed to clone {url}"))?;

        let head = repo
            .head()
            .context("Clone has no HEAD")?
            .peel_to_commit()
            .context("HEAD does not point at a commit")?;
        let head_sha = head.id().to_string();

        let paths = blob_paths(&head)?;
        tracing::info!(
            "Cloned {} @ {}: {} blobs at HEAD",
            url,
            &head_sha[..7.min(head_sha.len())],
            paths.len()
        );

        Ok(CloneSnapshot {
            head: head_sha,
            paths,
        })
    }
}

/// Walk the commit's tree and collect every blob's repository-relative path.
fn blob_paths(commit: &git2::Commit) -> Result<Vec<String>> {
    let tree = commit.tree().context("Commit has no tree")?;
    let mut paths = Vec::new();

    tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() == Some(git2::ObjectType::Blob) {
            if let Some(name) = entry.name() {
                paths.push(format!("{root}{name}"));
            }
        }
        git2::TreeWalkResult::Ok
    })
    .context("Failed to walk HEAD tree")?;

    Ok(paths)
}
