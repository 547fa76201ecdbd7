//! # repo-qa
//!
//! A web service that indexes git repositories and answers natural-language
//! questions about them with a retrieval-augmented pipeline.
//!
//! ## Architecture
//!
//! Indexing: a registered repo is shallow-cloned, its files are filtered
//! through an allow-list, split into fixed-size chunks, embedded in
//! batches, and persisted to SQLite together with status tracking on the
//! repo row.
//!
//! The answering pipeline is a directed acyclic graph (DAG):
//!
//! ```text
//!                       ┌─────────────┐
//!                       │  Question   │
//!                       └──────┬──────┘
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//!      ┌──────────────┐                ┌──────────────┐
//!      │  Summarize   │                │   Metadata   │
//!      │ (repo blurb) │                │ (file paths) │
//!      └──────┬───────┘                └──────┬───────┘
//!              └───────────────┬──────────────┘
//!                              ▼
//!                      ┌──────────────┐
//!                      │ Embed + Rank │
//!                      │ (cosine, k=3)│
//!                      └──────┬───────┘
//!          ┌──────────────────┼──────────────────┐
//!          ▼                  ▼                  ▼
//!   ┌────────────┐     ┌────────────┐     ┌────────────┐
//!   │   Logic    │     │    File    │     │    Arch    │
//!   │  research  │     │  research  │     │  research  │
//!   └──────┬─────┘     └──────┬─────┘     └──────┬─────┘
//!          └──────────────────┼──────────────────┘
//!                             ▼
//!                     ┌──────────────┐
//!                     │  Aggregate   │
//!                     │ (SSE stream) │
//!                     └──────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, database, and LLM settings
//! - [`models`] - Shared data types: `Repo`, `Chunk`, `IndexStatus`, request types
//! - [`store`] - SQLite persistence with cascading deletes and embedding blobs
//! - [`git`] - Shallow clone and HEAD file listing behind the `SourceFetcher` trait
//! - [`indexer`] - File selection, chunking, batch embedding, status transitions
//! - [`llm`] - Embedding and completion clients for Ollama or OpenAI-compatible APIs
//! - [`agent`] - The answering DAG: ranking, scoped research loops, aggregation
//! - [`api`] - Axum HTTP handlers for repo CRUD and the SSE chat endpoint
//! - [`state`] - Shared application state holding the store and injected clients

pub mod agent;
pub mod api;
pub mod config;
pub mod git;
pub mod indexer;
pub mod llm;
pub mod models;
pub mod state;
pub mod store;
