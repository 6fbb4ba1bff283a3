// Copyright 2025 Recollect Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Recollect Memory
//!
//! Semantic memory and retrieval caching for LLM agents:
//! - **Fact Memory**: scoped facts, deduplicated by embedding similarity at write time
//! - **Hybrid Retrieval**: exact, semantic and fuzzy tiers merged under one limit
//! - **Tool Result Cache**: per-conversation memo of tool calls with TTL expiry
//! - **Context Assembly**: categorized, token-budgeted prompt fragments behind a
//!   bounded time-windowed cache
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  PromptContextBuilder                        │
//! │  ┌────────────────┐  ┌──────────────────┐  ┌──────────────┐  │
//! │  │  ContextCache  │  │ ContextAssembler │  │  Summarizer  │  │
//! │  └────────────────┘  └──────────────────┘  └──────────────┘  │
//! └───────────────────────────────┬──────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────▼───────┐  ┌──────────────────┐
//! │  FactMemory ──► HybridRetriever       │  │ ToolResultCache  │
//! └──────────┬─────────────────┬──────────┘  └───┬──────────┬───┘
//!            │                 │                 │          │
//!   ┌────────▼────────┐  ┌─────▼─────────────────▼──┐       │
//!   │ EmbeddingGateway│◄─┤   (query embeddings)     │       │
//!   └─────────────────┘  └──────────────────────────┘       │
//!   ┌──────────────────────────────────────────────────────▼──┐
//!   │        SqliteStore (FactStore + ToolCacheStore)         │
//!   └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Embedding and summarizer failures never surface to callers: they degrade
//! to skipped tiers and bullet-point summaries. Read paths turn storage
//! failures into empty results; write paths return them.
//!
//! # Example
//!
//! ```rust,ignore
//! use recollect_memory::{
//!     EmbeddingGateway, FactMemory, MemoryConfig, OpenAiEmbeddingProvider, SqliteStore,
//! };
//! use recollect_core::EntryMetadata;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> recollect_memory::MemoryResult<()> {
//!     let config = MemoryConfig::load("recollect.toml")?;
//!     let store = Arc::new(SqliteStore::open(&config.storage.path)?);
//!     let provider = Arc::new(OpenAiEmbeddingProvider::from_config(&config.embedding)?);
//!     let gateway = Arc::new(EmbeddingGateway::new(provider, &config.embedding));
//!     let facts = FactMemory::new(store, gateway, &config);
//!
//!     facts.add("User prefers dark roast coffee", "u1", EntryMetadata::default()).await?;
//!     let hits = facts
//!         .search("roast", "u1", &facts.retriever().default_options())
//!         .await;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod context_cache;
pub mod embedding;
pub mod error;
pub mod facts;
pub mod retrieval;
pub mod sqlite;
pub mod storage;
pub mod summarizer;
pub mod testing;
pub mod tool_cache;

// Re-exports
pub use config::{
    ContextCacheConfig, EmbeddingConfig, MemoryConfig, RetrievalConfig, StorageConfig,
    SummarizerConfig, ToolCacheConfig,
};
pub use context::{
    AssembledContext, AssemblyRequest, ContextAssembler, ContextSection, PromptContextBuilder,
};
pub use context_cache::{ContextCache, ContextCacheKey};
pub use embedding::{EmbeddingGateway, EmbeddingProvider, OpenAiEmbeddingProvider};
pub use error::{MemoryError, MemoryResult};
pub use facts::{AddOutcome, FactMemory, FactUpdate};
pub use retrieval::{HybridRetriever, SearchOptions, SearchStrategy};
pub use sqlite::{MigrationReport, SqliteStore};
pub use storage::{FactStore, ToolCacheStore};
pub use summarizer::{OpenAiSummarizer, Summarizer};
pub use tool_cache::{ToolCacheHit, ToolCacheStats, ToolResultCache, ToolSearchOptions};
