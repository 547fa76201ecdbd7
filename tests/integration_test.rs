//! End-to-end tests over the indexing and answering pipelines with an
//! in-memory store and injected LLM/clone fakes.

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::Json;
use futures_util::stream;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use repo_qa::agent;
use repo_qa::api;
use repo_qa::config::Config;
use repo_qa::git::{CloneSnapshot, SourceFetcher};
use repo_qa::indexer;
use repo_qa::llm::{CompletionStream, LlmClient};
use repo_qa::models::{CreateRepoRequest, IndexStatus};
use repo_qa::state::AppState;
use repo_qa::store::Db;

/// Stages a fixed file tree into the clone destination. A path listed
/// with `None` content appears at HEAD but is never written to disk.
struct FakeFetcher {
    files: Vec<(&'static str, Option<&'static str>)>,
    fail: bool,
}

impl FakeFetcher {
    fn with_files(files: Vec<(&'static str, Option<&'static str>)>) -> Self {
        Self { files, fail: false }
    }

    fn failing() -> Self {
        Self {
            files: Vec::new(),
            fail: true,
        }
    }
}

impl SourceFetcher for FakeFetcher {
    fn shallow_clone(&self, _url: &str, dest: &Path) -> Result<CloneSnapshot> {
        if self.fail {
            anyhow::bail!("network unreachable");
        }
        let mut paths = Vec::new();
        for (path, content) in &self.files {
            paths.push(path.to_string());
            if let Some(content) = content {
                let abs = dest.join(path);
                if let Some(parent) = abs.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(abs, content)?;
            }
        }
        Ok(CloneSnapshot {
            head: "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            paths,
        })
    }
}

/// Deterministic LLM fake. Embeddings are derived from text length so
/// ranking is stable; completions are canned per prompt family. Batch
/// call indices listed in `fail_batches` error out.
struct FakeLlm {
    fail_batches: Vec<usize>,
    batch_calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    fn new() -> Self {
        Self {
            fail_batches: Vec::new(),
            batch_calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing_batches(fail_batches: Vec<usize>) -> Self {
        Self {
            fail_batches,
            ..Self::new()
        }
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0, 0.0])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches.contains(&call) {
            anyhow::bail!("embedding backend unavailable");
        }
        Ok(texts
            .iter()
            .map(|t| vec![1.0, t.len() as f32, 0.0])
            .collect())
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.starts_with("Provide a concise") {
            Ok("A compact demo service.".to_string())
        } else {
            // Research prompts get a stable output so the loop settles.
            Ok("stable findings".to_string())
        }
    }

    async fn complete_stream(&self, prompt: &str) -> Result<CompletionStream> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(Box::pin(stream::iter(vec![
            Ok("The ".to_string()),
            Ok("answer.".to_string()),
        ])))
    }
}

async fn app_state(llm: FakeLlm, fetcher: FakeFetcher) -> AppState {
    AppState {
        config: Config::default(),
        db: Db::connect_in_memory().await.unwrap(),
        llm: Arc::new(llm),
        fetcher: Arc::new(fetcher),
    }
}

// ─── Registration ────────────────────────────────────────

#[tokio::test]
async fn test_duplicate_registration_conflicts_and_keeps_one_row() {
    let state = app_state(FakeLlm::new(), FakeFetcher::with_files(Vec::new())).await;
    let req = CreateRepoRequest {
        owner: "acme".to_string(),
        name: "widgets".to_string(),
    };

    let (status, Json(repo)) =
        api::repos::create_repo(State(state.clone()), Json(req.clone()))
            .await
            .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(repo.full_name, "acme/widgets");
    assert_eq!(repo.clone_url, "https://github.com/acme/widgets.git");

    let err = api::repos::create_repo(State(state.clone()), Json(req))
        .await
        .unwrap_err();
    assert_eq!(err.0, StatusCode::CONFLICT);
    assert_eq!(state.db.list_repos().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_registration_rejects_blank_and_slashed_names() {
    let state = app_state(FakeLlm::new(), FakeFetcher::with_files(Vec::new())).await;

    let blank = CreateRepoRequest {
        owner: "  ".to_string(),
        name: "x".to_string(),
    };
    let err = api::repos::create_repo(State(state.clone()), Json(blank))
        .await
        .unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);

    let slashed = CreateRepoRequest {
        owner: "a/b".to_string(),
        name: "x".to_string(),
    };
    let err = api::repos::create_repo(State(state), Json(slashed))
        .await
        .unwrap_err();
    assert_eq!(err.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_and_delete_unknown_repo_are_404() {
    let state = app_state(FakeLlm::new(), FakeFetcher::with_files(Vec::new())).await;

    let err = api::repos::get_repo(State(state.clone()), AxumPath(999))
        .await
        .unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);

    let err = api::repos::delete_repo(State(state), AxumPath(999))
        .await
        .unwrap_err();
    assert_eq!(err.0, StatusCode::NOT_FOUND);
}

// ─── Indexing ────────────────────────────────────────────

#[tokio::test]
async fn test_successful_run_indexes_selected_files() {
    let db = Db::connect_in_memory().await.unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(FakeLlm::new());
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(FakeFetcher::with_files(vec![
        ("src/main.rs", Some("fn main() { println!(\"hi\"); }")),
        ("Dockerfile", Some("FROM rust:1.80")),
        ("logo.png", Some("binary-ish")),
        ("bin/tool", Some("not indexable")),
    ]));

    let repo = db
        .create_repo("acme", "widgets", "url", "main")
        .await
        .unwrap();
    indexer::index_repo(&db, llm, fetcher, &repo).await.unwrap();

    let updated = db.get_repo(repo.id).await.unwrap().unwrap();
    assert_eq!(updated.index_status, IndexStatus::Complete);
    assert!(updated.indexed_at.is_some());

    // Only the allow-listed files got File rows.
    let paths = db.file_paths(repo.id).await.unwrap();
    assert_eq!(paths, vec!["src/main.rs".to_string(), "Dockerfile".to_string()]);
    assert_eq!(db.chunk_count(repo.id).await.unwrap(), 2);
}

#[tokio::test]
async fn test_clone_failure_sets_error_with_no_rows() {
    let db = Db::connect_in_memory().await.unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(FakeLlm::new());
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(FakeFetcher::failing());

    let repo = db.create_repo("a", "b", "url", "main").await.unwrap();
    let result = indexer::index_repo(&db, llm, fetcher, &repo).await;
    assert!(result.is_err());

    let updated = db.get_repo(repo.id).await.unwrap().unwrap();
    assert_eq!(updated.index_status, IndexStatus::Error);
    assert!(updated.indexed_at.is_none());
    assert_eq!(db.file_count(repo.id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unreadable_file_keeps_record_without_chunks() {
    let db = Db::connect_in_memory().await.unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(FakeLlm::new());
    // "ghost.py" is listed at HEAD but never lands on disk.
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(FakeFetcher::with_files(vec![
        ("ghost.py", None),
        ("real.py", Some("print('ok')")),
    ]));

    let repo = db.create_repo("a", "b", "url", "main").await.unwrap();
    indexer::index_repo(&db, llm, fetcher, &repo).await.unwrap();

    assert_eq!(db.file_count(repo.id).await.unwrap(), 2);
    assert_eq!(db.chunk_count(repo.id).await.unwrap(), 1);
    let chunks = db.chunks_for_repo(repo.id, None).await.unwrap();
    assert_eq!(chunks[0].content, "print('ok')");
}

#[tokio::test]
async fn test_failed_embedding_batch_skipped_run_completes() {
    let db = Db::connect_in_memory().await.unwrap();
    // First batch (64 fragments) fails, the remainder succeeds.
    let llm: Arc<dyn LlmClient> = Arc::new(FakeLlm::failing_batches(vec![0]));
    let big = "x".repeat(70 * indexer::CHUNK_SIZE);
    let content: &'static str = Box::leak(big.into_boxed_str());
    let fetcher: Arc<dyn SourceFetcher> =
        Arc::new(FakeFetcher::with_files(vec![("src/big.rs", Some(content))]));

    let repo = db.create_repo("a", "b", "url", "main").await.unwrap();
    indexer::index_repo(&db, llm, fetcher, &repo).await.unwrap();

    let updated = db.get_repo(repo.id).await.unwrap().unwrap();
    assert_eq!(updated.index_status, IndexStatus::Complete);
    // 70 fragments minus the failed batch of 64.
    assert_eq!(db.chunk_count(repo.id).await.unwrap(), 6);
}

#[tokio::test]
async fn test_delete_cascades_to_files_and_chunks() {
    let db = Db::connect_in_memory().await.unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(FakeLlm::new());
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(FakeFetcher::with_files(vec![
        ("src/lib.rs", Some("pub fn f() {}")),
        ("src/main.rs", Some("fn main() {}")),
    ]));

    let repo = db.create_repo("a", "b", "url", "main").await.unwrap();
    indexer::index_repo(&db, llm, fetcher, &repo).await.unwrap();
    assert_eq!(db.file_count(repo.id).await.unwrap(), 2);
    assert_eq!(db.chunk_count(repo.id).await.unwrap(), 2);

    assert!(db.delete_repo(repo.id).await.unwrap());
    assert_eq!(db.file_count(repo.id).await.unwrap(), 0);
    assert_eq!(db.chunk_count(repo.id).await.unwrap(), 0);
}

// ─── Answering ───────────────────────────────────────────

#[tokio::test]
async fn test_answer_pipeline_streams_aggregate_tokens() {
    let db = Db::connect_in_memory().await.unwrap();
    let llm: Arc<dyn LlmClient> = Arc::new(FakeLlm::new());
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(FakeFetcher::with_files(vec![
        ("src/auth.rs", Some("fn login(user: &str) -> bool { true }")),
        ("src/db.rs", Some("fn connect() {}")),
    ]));

    let repo = db.create_repo("a", "b", "url", "main").await.unwrap();
    indexer::index_repo(&db, llm.clone(), fetcher, &repo)
        .await
        .unwrap();

    let mut rx = agent::run_streaming(db, llm, repo.id, "How does login work?".to_string());
    let mut streamed = String::new();
    while let Some(token) = rx.recv().await {
        let token = token.unwrap();
        assert_eq!(token.stage, "aggregate");
        streamed.push_str(&token.text);
    }
    assert_eq!(streamed, "The answer.");
}

#[tokio::test]
async fn test_answer_pipeline_final_state_and_prompt() {
    let db = Db::connect_in_memory().await.unwrap();
    let llm = Arc::new(FakeLlm::new());
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(FakeFetcher::with_files(vec![(
        "src/main.rs",
        Some("fn main() {}"),
    )]));

    let repo = db.create_repo("a", "b", "url", "main").await.unwrap();
    indexer::index_repo(&db, llm.clone(), fetcher, &repo)
        .await
        .unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let run = agent::run(
        db,
        llm.clone(),
        repo.id,
        "What does this do?".to_string(),
        tx,
    );
    let drain = async {
        while rx.recv().await.is_some() {}
    };
    let (final_state, _) = tokio::join!(run, drain);
    let final_state = final_state.unwrap();

    assert_eq!(final_state.summary.as_deref(), Some("A compact demo service."));
    assert_eq!(final_state.file_paths.as_deref(), Some(&["src/main.rs".to_string()][..]));
    assert_eq!(final_state.research_logic.as_deref(), Some("stable findings"));
    assert_eq!(final_state.answer.as_deref(), Some("The answer."));

    // The aggregation prompt carries every produced section.
    let prompts = llm.prompts.lock().unwrap();
    let aggregate = prompts
        .iter()
        .find(|p| p.contains("Answer to 'What does this do?':"))
        .expect("aggregation prompt recorded");
    assert!(aggregate.contains("Overview:\nA compact demo service."));
    assert!(aggregate.contains("Files:\nsrc/main.rs"));
    assert!(aggregate.contains("Logic Research:\nstable findings"));
    assert!(aggregate.contains("Arch Research:\nstable findings"));
}

#[tokio::test]
async fn test_answer_pipeline_surfaces_terminal_error() {
    struct BrokenLlm;

    #[async_trait]
    impl LlmClient for BrokenLlm {
        async fn embed_query(&self, _: &str) -> Result<Vec<f32>> {
            anyhow::bail!("embeddings offline")
        }
        async fn embed_batch(&self, _: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("embeddings offline")
        }
        async fn complete(&self, _: &str) -> Result<String> {
            Ok("ok".to_string())
        }
        async fn complete_stream(&self, _: &str) -> Result<CompletionStream> {
            anyhow::bail!("completions offline")
        }
    }

    let db = Db::connect_in_memory().await.unwrap();
    let repo = db.create_repo("a", "b", "url", "main").await.unwrap();

    let mut rx = agent::run_streaming(db, Arc::new(BrokenLlm), repo.id, "q".to_string());
    let mut saw_error = false;
    while let Some(token) = rx.recv().await {
        if token.is_err() {
            saw_error = true;
        }
    }
    assert!(saw_error);
}
