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

//! Memory system configuration
//!
//! Every section has a `Default`, so a TOML file only needs the keys it
//! overrides:
//!
//! ```toml
//! [retrieval]
//! dedup_threshold = 0.85
//!
//! [tool_cache]
//! ttl_secs = 3600
//! ```

use crate::error::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the memory engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub tool_cache: ToolCacheConfig,
    pub context_cache: ContextCacheConfig,
    /// Summarizer endpoint; history summaries fall back to bullets without it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summarizer: Option<SummarizerConfig>,
}

impl MemoryConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> MemoryResult<Self> {
        let config: MemoryConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> MemoryResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> MemoryResult<()> {
        check_threshold("retrieval.similarity_threshold", self.retrieval.similarity_threshold)?;
        check_threshold("retrieval.dedup_threshold", self.retrieval.dedup_threshold)?;
        check_threshold("retrieval.fuzzy_score", self.retrieval.fuzzy_score)?;
        check_threshold("tool_cache.similarity_threshold", self.tool_cache.similarity_threshold)?;
        check_threshold("tool_cache.fallback_score", self.tool_cache.fallback_score)?;
        check_threshold("context_cache.min_score", self.context_cache.min_score)?;

        check_nonzero("storage.timeout_ms", self.storage.timeout_ms)?;
        check_nonzero("embedding.timeout_ms", self.embedding.timeout_ms)?;
        check_nonzero("embedding.max_input_chars", self.embedding.max_input_chars as u64)?;
        check_nonzero("retrieval.default_limit", self.retrieval.default_limit as u64)?;
        check_nonzero("tool_cache.default_limit", self.tool_cache.default_limit as u64)?;
        check_nonzero("tool_cache.sweep_interval_secs", self.tool_cache.sweep_interval_secs)?;
        if self.tool_cache.ttl_secs > MAX_TOOL_TTL_SECS {
            return Err(MemoryError::ConfigError(format!(
                "tool_cache.ttl_secs must be at most {}, got {}",
                MAX_TOOL_TTL_SECS, self.tool_cache.ttl_secs
            )));
        }
        check_nonzero("context_cache.window_secs", self.context_cache.window_secs)?;
        check_nonzero("context_cache.capacity", self.context_cache.capacity as u64)?;
        check_nonzero("context_cache.fragment_limit", self.context_cache.fragment_limit as u64)?;

        if let Some(summarizer) = &self.summarizer {
            check_nonzero("summarizer.timeout_ms", summarizer.timeout_ms)?;
        }
        Ok(())
    }
}

fn check_threshold(key: &str, value: f32) -> MemoryResult<()> {
    if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
        return Err(MemoryError::ConfigError(format!(
            "{} must be within [-1, 1], got {}",
            key, value
        )));
    }
    Ok(())
}

fn check_nonzero(key: &str, value: u64) -> MemoryResult<()> {
    if value == 0 {
        return Err(MemoryError::ConfigError(format!("{} must be greater than 0", key)));
    }
    Ok(())
}

/// Persistent store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub path: PathBuf,
    /// Upper bound on a single store call
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("recollect")
            .join("memory.db");

        Self {
            path,
            timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Embedding provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible API root
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Embedding dimensions
    pub dimensions: usize,
    /// Inputs are truncated to this many characters
    pub max_input_chars: usize,
    pub timeout_ms: u64,
    /// Query embeddings kept in memory (0 disables the cache)
    pub query_cache_size: u64,
    pub query_cache_ttl_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimensions: 1536,
            max_input_chars: 28_000,
            timeout_ms: 10_000,
            query_cache_size: 1_024,
            query_cache_ttl_secs: 300,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn query_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.query_cache_ttl_secs)
    }
}

/// Hybrid search and dedup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    /// Minimum cosine similarity for the semantic tier
    pub similarity_threshold: f32,
    /// Minimum cosine similarity for a write to collapse onto an existing fact
    pub dedup_threshold: f32,
    /// Score assigned to fuzzy keyword matches
    pub fuzzy_score: f32,
    /// Shortest accepted fact, in characters after trimming
    pub min_content_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            similarity_threshold: 0.7,
            dedup_threshold: 0.7,
            fuzzy_score: 0.6,
            min_content_chars: 10,
        }
    }
}

/// Longest accepted tool-result TTL (100 years)
pub const MAX_TOOL_TTL_SECS: u64 = 100 * 365 * 86_400;

/// Tool-result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolCacheConfig {
    pub ttl_secs: u64,
    pub similarity_threshold: f32,
    /// Score for substring matches when the query cannot be embedded
    pub fallback_score: f32,
    pub default_limit: usize,
    pub sweep_interval_secs: u64,
}

impl Default for ToolCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 86_400,
            similarity_threshold: 0.8,
            fallback_score: 0.5,
            default_limit: 5,
            sweep_interval_secs: 3_600,
        }
    }
}

impl ToolCacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs.min(MAX_TOOL_TTL_SECS) as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Assembled-context cache and packing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextCacheConfig {
    /// Freshness window for cached results
    pub window_secs: u64,
    /// Maximum cached results
    pub capacity: usize,
    /// Query characters that form the cache key
    pub key_prefix_chars: usize,
    /// Fragments fetched per build
    pub fragment_limit: usize,
    /// Fragments below this score are dropped
    pub min_score: f32,
    /// Token budget for the rendered context
    pub token_budget: usize,
}

impl Default for ContextCacheConfig {
    fn default() -> Self {
        Self {
            window_secs: 300,
            capacity: 100,
            key_prefix_chars: 50,
            fragment_limit: 20,
            min_score: 0.5,
            token_budget: 2_000,
        }
    }
}

impl ContextCacheConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Summarizer endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_ms: u64,
    /// Entries fed to the summarizer
    pub history_limit: usize,
    /// Entries rendered as bullets when summarization is unavailable
    pub fallback_entries: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_ms: 15_000,
            history_limit: 10,
            fallback_entries: 5,
        }
    }
}

impl SummarizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
