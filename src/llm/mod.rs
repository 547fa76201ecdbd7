//! LLM access: embeddings and chat completions via Ollama or
//! OpenAI-compatible APIs.
//!
//! All model calls go through the [`LlmClient`] trait so pipelines can be
//! constructed with fakes in tests. [`HttpLlmClient`] is the production
//! implementation.

pub mod chat;
pub mod embeddings;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::Stream;
use std::pin::Pin;

use crate::config::LlmConfig;

/// Stream of incremental completion text deltas.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Embedding and completion operations used by the indexing and answering
/// pipelines.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed one batch of texts in a single request. Vectors come back in
    /// input order; callers zip ordinally. Callers are responsible for
    /// splitting large inputs into batches.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Run one completion over a single user prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Streaming variant of [`complete`](LlmClient::complete).
    async fn complete_stream(&self, prompt: &str) -> Result<CompletionStream>;
}

/// HTTP-backed [`LlmClient`] speaking the Ollama or OpenAI wire formats.
pub struct HttpLlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results.into_iter().next().context("No embedding returned")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        embeddings::embed_batch(&self.http, &self.config, texts).await
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        chat::complete(&self.http, &self.config, prompt).await
    }

    async fn complete_stream(&self, prompt: &str) -> Result<CompletionStream> {
        chat::stream_completion(&self.http, &self.config, prompt).await
    }
}
