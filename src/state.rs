use std::sync::Arc;

use crate::config::Config;
use crate::git::{GitFetcher, SourceFetcher};
use crate::llm::{HttpLlmClient, LlmClient};
use crate::store::Db;

/// Shared application state. The LLM client and source fetcher sit behind
/// trait objects so handlers and background tasks never reach for globals,
/// and tests can swap in fakes.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: Db,
    pub llm: Arc<dyn LlmClient>,
    pub fetcher: Arc<dyn SourceFetcher>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db = Db::connect(&config.database_url).await?;
        let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(config.llm.clone())?);

        Ok(Self {
            config,
            db,
            llm,
            fetcher: Arc::new(GitFetcher),
        })
    }
}
