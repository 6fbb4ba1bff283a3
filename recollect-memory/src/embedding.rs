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

//! Embedding provider and gateway
//!
//! The gateway is the only way the rest of the crate reaches the provider.
//! It truncates oversized input, bounds every call with a timeout, and turns
//! every failure into `None` so that callers degrade instead of erroring.

use crate::config::EmbeddingConfig;
use crate::error::{MemoryError, MemoryResult};
use async_trait::async_trait;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// A text-to-vector service
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>>;

    /// Dimension of the vectors this provider returns
    fn dimension(&self) -> usize;

    /// Model identifier, used in logs
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible `/embeddings` client
pub struct OpenAiEmbeddingProvider {
    api_key: String,
    model: String,
    dimensions: usize,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_key: String, model: String, dimensions: usize) -> Self {
        Self {
            api_key,
            model,
            dimensions,
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Build from config, reading the API key from the configured variable
    pub fn from_config(config: &EmbeddingConfig) -> MemoryResult<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            MemoryError::ConfigError(format!("{} is not set", config.api_key_env))
        })?;
        Ok(Self::new(api_key, config.model.clone(), config.dimensions)
            .with_base_url(config.base_url.clone()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let mut request = serde_json::json!({
            "model": self.model,
            "input": text,
        });
        // Only the v3 models accept a reduced dimension
        if self.model.starts_with("text-embedding-3") {
            request["dimensions"] = serde_json::json!(self.dimensions);
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(MemoryError::EmbeddingError(format!(
                "{}: {}",
                status, error_text
            )));
        }

        let response_data: serde_json::Value = response.json().await?;
        let embedding: Vec<f32> = response_data["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| MemoryError::EmbeddingError("No embedding returned".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|v| v as f32)
            .collect();

        if embedding.is_empty() {
            return Err(MemoryError::EmbeddingError("Empty embedding returned".to_string()));
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Failure-absorbing front of an [`EmbeddingProvider`]
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    timeout: Duration,
    max_input_chars: usize,
    query_cache: Option<Cache<String, Vec<f32>>>,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        let query_cache = (config.query_cache_size > 0).then(|| {
            Cache::builder()
                .max_capacity(config.query_cache_size)
                .time_to_live(config.query_cache_ttl())
                .build()
        });

        Self {
            provider,
            timeout: config.timeout(),
            max_input_chars: config.max_input_chars,
            query_cache,
        }
    }

    /// Embed text for storage. Never errors; failures are logged and yield `None`.
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let input = truncate_chars(text, self.max_input_chars);
        if input.len() < text.len() {
            debug!(
                original_chars = text.chars().count(),
                max_chars = self.max_input_chars,
                "Truncated embedding input"
            );
        }

        match tokio::time::timeout(self.timeout, self.provider.embed(input)).await {
            Ok(Ok(embedding)) if !embedding.is_empty() => Some(embedding),
            Ok(Ok(_)) => {
                warn!(
                    model = self.provider.model_name(),
                    "Embedding provider returned an empty vector"
                );
                None
            }
            Ok(Err(e)) => {
                warn!(model = self.provider.model_name(), error = %e, "Embedding failed");
                None
            }
            Err(_) => {
                warn!(
                    model = self.provider.model_name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Embedding timed out"
                );
                None
            }
        }
    }

    /// Embed a search query, reusing recent query vectors
    pub async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        let Some(cache) = &self.query_cache else {
            return self.embed(query).await;
        };

        let cache_key = query.trim().to_lowercase();
        if let Some(embedding) = cache.get(&cache_key) {
            debug!("Query embedding cache hit");
            return Some(embedding);
        }

        let embedding = self.embed(query).await?;
        cache.insert(cache_key, embedding.clone());
        Some(embedding)
    }

    /// Number of cached query embeddings
    pub fn cached_queries(&self) -> u64 {
        self.query_cache
            .as_ref()
            .map(|c| {
                c.run_pending_tasks();
                c.entry_count()
            })
            .unwrap_or(0)
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }
}

/// Longest prefix of `text` with at most `max_chars` characters
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
