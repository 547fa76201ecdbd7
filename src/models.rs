use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: i64,
    pub owner: String,
    pub name: String,
    /// Unique "owner/name" identifier.
    pub full_name: String,
    pub clone_url: String,
    pub default_branch: String,
    pub index_status: IndexStatus,
    pub indexed_at: Option<DateTime<Utc>>,
}

/// Lifecycle of a repository's index. Transitions only move forward:
/// pending → indexing → {complete, error}. A new indexing run resets
/// the status to indexing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Pending,
    Indexing,
    Complete,
    Error,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Pending => "pending",
            IndexStatus::Indexing => "indexing",
            IndexStatus::Complete => "complete",
            IndexStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(IndexStatus::Pending),
            "indexing" => Some(IndexStatus::Indexing),
            "complete" => Some(IndexStatus::Complete),
            "error" => Some(IndexStatus::Error),
            _ => None,
        }
    }
}

/// A bounded slice of a file's text with its embedding, the unit of
/// retrieval. Immutable once written.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: i64,
    pub file_id: i64,
    pub start_line: i64,
    pub end_line: i64,
    pub content: String,
    pub embedding: Vec<f32>,
}

/// Register-repo request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRepoRequest {
    pub owner: String,
    pub name: String,
}

/// Chat request: a repo plus the conversation so far. The last user
/// message is the question the answering pipeline works on.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub repo_id: i64,
    pub messages: Vec<ChatMessage>,
}

/// A single chat turn (user or assistant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_status_serializes_to_snake_case() {
        let json = serde_json::to_value(IndexStatus::Indexing).unwrap();
        assert_eq!(json, "indexing");
    }

    #[test]
    fn test_index_status_round_trips_through_str() {
        for status in [
            IndexStatus::Pending,
            IndexStatus::Indexing,
            IndexStatus::Complete,
            IndexStatus::Error,
        ] {
            assert_eq!(IndexStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(IndexStatus::parse("ready"), None);
    }
}
