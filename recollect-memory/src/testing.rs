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

//! Deterministic test doubles
//!
//! Offline stand-ins for the embedding provider, the summarizer and the
//! store, for use in tests of this crate and of crates that embed it.

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, MemoryResult};
use crate::storage::{FactStore, ToolCacheStore};
use crate::summarizer::Summarizer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recollect_core::{Entry, EntryId, ToolCacheEntry};

/// Bag-of-words embedder.
///
/// Lowercased alphanumeric tokens are hashed into a fixed number of buckets
/// and the counts are L2-normalized, so texts with the same words embed
/// identically regardless of case and punctuation.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self::with_dimensions(256)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed synchronously
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = blake3::hash(token.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&hash.as_bytes()[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
            vector[idx] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn dimension(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hashing-bow"
    }
}

/// Embedder whose every call fails
#[derive(Debug, Clone, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> MemoryResult<Vec<f32>> {
        Err(MemoryError::EmbeddingError("provider unavailable".to_string()))
    }

    fn dimension(&self) -> usize {
        256
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Summarizer that always answers with the same text
#[derive(Debug, Clone)]
pub struct StaticSummarizer {
    reply: String,
}

impl StaticSummarizer {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl Summarizer for StaticSummarizer {
    async fn summarize(&self, _prompt: &str) -> MemoryResult<String> {
        Ok(self.reply.clone())
    }
}

/// Summarizer whose every call fails
#[derive(Debug, Clone, Default)]
pub struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _prompt: &str) -> MemoryResult<String> {
        Err(MemoryError::SummarizerError("summarizer unavailable".to_string()))
    }
}

/// Store whose every call fails
#[derive(Debug, Clone, Default)]
pub struct UnavailableStore;

fn unavailable<T>() -> MemoryResult<T> {
    Err(MemoryError::StorageError("store unavailable".to_string()))
}

#[async_trait]
impl FactStore for UnavailableStore {
    async fn insert_fact(&self, _entry: &Entry) -> MemoryResult<()> {
        unavailable()
    }

    async fn scan_facts(&self, _scope: &str) -> MemoryResult<Vec<Entry>> {
        unavailable()
    }

    async fn scan_embedded_facts(&self, _scope: &str) -> MemoryResult<Vec<Entry>> {
        unavailable()
    }

    async fn get_fact(&self, _scope: &str, _id: &EntryId) -> MemoryResult<Option<Entry>> {
        unavailable()
    }

    async fn update_fact(&self, _entry: &Entry) -> MemoryResult<bool> {
        unavailable()
    }

    async fn delete_fact(&self, _scope: &str, _id: &EntryId) -> MemoryResult<bool> {
        unavailable()
    }

    async fn delete_scope(&self, _scope: &str) -> MemoryResult<usize> {
        unavailable()
    }
}

#[async_trait]
impl ToolCacheStore for UnavailableStore {
    async fn insert_tool_result(&self, _entry: &ToolCacheEntry) -> MemoryResult<()> {
        unavailable()
    }

    async fn find_exact(
        &self,
        _conversation_id: &str,
        _tool_name: &str,
        _input_params: &str,
        _now: DateTime<Utc>,
    ) -> MemoryResult<Option<ToolCacheEntry>> {
        unavailable()
    }

    async fn list_live(
        &self,
        _conversation_id: &str,
        _tool_name: Option<&str>,
        _now: DateTime<Utc>,
    ) -> MemoryResult<Vec<ToolCacheEntry>> {
        unavailable()
    }

    async fn delete_expired(&self, _now: DateTime<Utc>) -> MemoryResult<usize> {
        unavailable()
    }

    async fn delete_conversation(&self, _conversation_id: &str) -> MemoryResult<usize> {
        unavailable()
    }

    async fn count_tool_results(&self, _conversation_id: &str) -> MemoryResult<usize> {
        unavailable()
    }
}
