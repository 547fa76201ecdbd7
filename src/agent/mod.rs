//! Answering pipeline: retrieval-augmented, multi-scope research over an
//! indexed repository.
//!
//! Stage layout (an explicit DAG, see [`graph`]):
//!
//! ```text
//!   summarize ─┐                       ┌─ research_logic ─┐
//!              ├─ embed ─ fetch_context ┼─ research_file ──┼─ aggregate
//!   metadata ──┘                       └─ research_arch ──┘
//! ```
//!
//! The summary and metadata branches, and the three research scopes, are
//! mutually independent and run concurrently; the aggregate stage is the
//! single barrier. Only aggregate-stage tokens are surfaced to callers.

pub mod aggregate;
pub mod graph;
pub mod ranker;
pub mod research;

use anyhow::Result;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::llm::LlmClient;
use crate::store::Db;
use graph::{NodeFuture, TaskGraph};
use research::Scope;

/// Ranked chunks fed into the research scopes.
pub const CONTEXT_CHUNKS: usize = 3;

/// Chunks (in persisted order, not by similarity) fed to the summarizer.
pub const SUMMARY_CHUNKS: i64 = 10;

/// Cross-stage state. Each stage reads the fields its dependencies filled
/// in and writes through a typed [`StateUpdate`].
#[derive(Debug, Clone)]
pub struct AgentState {
    pub repo_id: i64,
    pub question: String,
    pub embedding: Vec<f32>,
    pub context: Option<String>,
    pub summary: Option<String>,
    pub file_paths: Option<Vec<String>>,
    pub research_logic: Option<String>,
    pub research_file: Option<String>,
    pub research_arch: Option<String>,
    pub answer: Option<String>,
}

impl AgentState {
    pub fn new(repo_id: i64, question: String) -> Self {
        Self {
            repo_id,
            question,
            embedding: Vec::new(),
            context: None,
            summary: None,
            file_paths: None,
            research_logic: None,
            research_file: None,
            research_arch: None,
            answer: None,
        }
    }

    pub fn research(&self, scope: Scope) -> Option<&str> {
        match scope {
            Scope::Logic => self.research_logic.as_deref(),
            Scope::File => self.research_file.as_deref(),
            Scope::Arch => self.research_arch.as_deref(),
        }
    }

    pub fn apply(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::Embedding(v) => self.embedding = v,
            StateUpdate::Context(s) => self.context = Some(s),
            StateUpdate::Summary(s) => self.summary = Some(s),
            StateUpdate::FilePaths(p) => self.file_paths = Some(p),
            StateUpdate::Research(Scope::Logic, s) => self.research_logic = Some(s),
            StateUpdate::Research(Scope::File, s) => self.research_file = Some(s),
            StateUpdate::Research(Scope::Arch, s) => self.research_arch = Some(s),
            StateUpdate::Answer(s) => self.answer = Some(s),
        }
    }
}

/// A stage's contribution to the shared state.
#[derive(Debug, Clone)]
pub enum StateUpdate {
    Embedding(Vec<f32>),
    Context(String),
    Summary(String),
    FilePaths(Vec<String>),
    Research(Scope, String),
    Answer(String),
}

/// An incremental completion token tagged with the stage that produced it.
#[derive(Debug, Clone)]
pub struct StageToken {
    pub stage: &'static str,
    pub text: String,
}

/// Kick off one answering run; tokens (and a terminal error, if any)
/// arrive on the returned channel as they are produced.
pub fn run_streaming(
    db: Db,
    llm: Arc<dyn LlmClient>,
    repo_id: i64,
    question: String,
) -> mpsc::Receiver<Result<StageToken>> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(async move {
        if let Err(e) = run(db, llm, repo_id, question, tx.clone()).await {
            let _ = tx.send(Err(e)).await;
        }
    });
    rx
}

/// Run the full pipeline, forwarding stage tokens to `tokens`. Returns the
/// final state once the aggregate stage has finished.
pub async fn run(
    db: Db,
    llm: Arc<dyn LlmClient>,
    repo_id: i64,
    question: String,
    tokens: mpsc::Sender<Result<StageToken>>,
) -> Result<AgentState> {
    let mut g = TaskGraph::new();

    // Repo overview from the first chunks in persisted order.
    {
        let db = db.clone();
        let llm = llm.clone();
        g.add_node("summarize", &[], move |state| {
            let db = db.clone();
            let llm = llm.clone();
            Box::pin(async move {
                let chunks = db.chunks_for_repo(state.repo_id, Some(SUMMARY_CHUNKS)).await?;
                let snippet = chunks
                    .iter()
                    .map(|c| c.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n");
                let prompt =
                    format!("Provide a concise 2-3 paragraph overview of this codebase:\n{snippet}");
                let summary = llm.complete(&prompt).await?;
                Ok(vec![StateUpdate::Summary(summary)])
            }) as NodeFuture
        });
    }

    // File-path listing for the final answer.
    {
        let db = db.clone();
        g.add_node("metadata", &[], move |state| {
            let db = db.clone();
            Box::pin(async move {
                let paths = db.file_paths(state.repo_id).await?;
                Ok(vec![StateUpdate::FilePaths(paths)])
            }) as NodeFuture
        });
    }

    // Embed the question to drive similarity search.
    {
        let llm = llm.clone();
        g.add_node("embed", &["summarize", "metadata"], move |state| {
            let llm = llm.clone();
            Box::pin(async move {
                let embedding = llm.embed_query(&state.question).await?;
                Ok(vec![StateUpdate::Embedding(embedding)])
            }) as NodeFuture
        });
    }

    // Rank the repo's chunk set against the question embedding.
    {
        let db = db.clone();
        g.add_node("fetch_context", &["embed"], move |state| {
            let db = db.clone();
            Box::pin(async move {
                let chunks = db.chunks_for_repo(state.repo_id, None).await?;
                let candidates: Vec<(i64, Vec<f32>)> =
                    chunks.iter().map(|c| (c.id, c.embedding.clone())).collect();
                let top = ranker::rank_by_similarity(&state.embedding, &candidates, CONTEXT_CHUNKS);

                let by_id: HashMap<i64, &str> =
                    chunks.iter().map(|c| (c.id, c.content.as_str())).collect();
                let context = top
                    .iter()
                    .filter_map(|id| by_id.get(id).copied())
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(vec![StateUpdate::Context(context)])
            }) as NodeFuture
        });
    }

    // Independent research scopes over the shared ranked context.
    for scope in Scope::ALL {
        let llm = llm.clone();
        g.add_node(research_node_name(scope), &["fetch_context"], move |state| {
            let llm = llm.clone();
            Box::pin(async move {
                let seed = state.context.as_deref().unwrap_or_default();
                let output =
                    research::research_loop(llm.as_ref(), scope, seed, &state.question).await?;
                Ok(vec![StateUpdate::Research(scope, output)])
            }) as NodeFuture
        });
    }

    // Barrier: merge everything and stream the final answer.
    {
        let llm = llm.clone();
        let tokens = tokens.clone();
        g.add_node(
            "aggregate",
            &["research_logic", "research_file", "research_arch"],
            move |state| {
                let llm = llm.clone();
                let tokens = tokens.clone();
                Box::pin(async move {
                    let prompt = aggregate::build_prompt(&state);
                    let mut stream = llm.complete_stream(&prompt).await?;
                    let mut answer = String::new();
                    while let Some(delta) = stream.next().await {
                        let delta = delta?;
                        answer.push_str(&delta);
                        let token = StageToken {
                            stage: "aggregate",
                            text: delta,
                        };
                        if tokens.send(Ok(token)).await.is_err() {
                            // Caller went away; finish the state quietly.
                            break;
                        }
                    }
                    Ok(vec![StateUpdate::Answer(answer)])
                }) as NodeFuture
            },
        );
    }

    g.run(AgentState::new(repo_id, question)).await
}

fn research_node_name(scope: Scope) -> &'static str {
    match scope {
        Scope::Logic => "research_logic",
        Scope::File => "research_file",
        Scope::Arch => "research_arch",
    }
}
