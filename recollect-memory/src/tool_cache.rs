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

//! Tool-result cache
//!
//! Memoizes tool invocations per conversation. Lookups are either exact
//! (same tool, same canonical input) or semantic (a free-text query scored
//! against input embeddings). Expired rows are invisible to every lookup
//! and are physically removed by [`ToolResultCache::purge_expired`], which
//! runs at the start of each search and from the background sweeper.

use crate::config::{MemoryConfig, ToolCacheConfig};
use crate::embedding::EmbeddingGateway;
use crate::error::MemoryResult;
use crate::storage::{timed, ToolCacheStore};
use chrono::Utc;
use recollect_core::{canonical_json, cosine_similarity, ToolCacheEntry};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Parameters for [`ToolResultCache::search`]
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSearchOptions {
    /// Restrict to one tool
    pub tool_name: Option<String>,
    pub limit: usize,
    pub similarity_threshold: f32,
}

impl Default for ToolSearchOptions {
    fn default() -> Self {
        Self {
            tool_name: None,
            limit: 5,
            similarity_threshold: 0.8,
        }
    }
}

impl ToolSearchOptions {
    pub fn for_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.tool_name = Some(tool_name.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// A cached invocation with its relevance score
#[derive(Debug, Clone)]
pub struct ToolCacheHit {
    pub entry: ToolCacheEntry,
    pub score: f32,
}

impl ToolCacheHit {
    pub fn output(&self) -> Value {
        self.entry.output()
    }
}

/// Exact-lookup statistics
#[derive(Debug, Clone, Default)]
pub struct ToolCacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

/// Per-conversation memo of tool results
pub struct ToolResultCache {
    store: Arc<dyn ToolCacheStore>,
    gateway: Arc<EmbeddingGateway>,
    config: ToolCacheConfig,
    store_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ToolResultCache {
    pub fn new(
        store: Arc<dyn ToolCacheStore>,
        gateway: Arc<EmbeddingGateway>,
        config: &MemoryConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config: config.tool_cache.clone(),
            store_timeout: config.storage.timeout(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Search options seeded from config
    pub fn default_options(&self) -> ToolSearchOptions {
        ToolSearchOptions {
            tool_name: None,
            limit: self.config.default_limit,
            similarity_threshold: self.config.similarity_threshold,
        }
    }

    /// Record a successful invocation
    pub async fn store(
        &self,
        conversation_id: &str,
        tool_name: &str,
        input: &Value,
        output: &Value,
        metadata: Value,
    ) -> MemoryResult<ToolCacheEntry> {
        let mut entry =
            ToolCacheEntry::new(conversation_id, tool_name, input, output, self.config.ttl());
        entry.metadata = metadata;
        entry.input_embedding = self.gateway.embed(&entry.input_params).await;

        timed(
            "insert_tool_result",
            self.store_timeout,
            self.store.insert_tool_result(&entry),
        )
        .await?;

        debug!(
            conversation_id = %conversation_id,
            tool = %tool_name,
            input_hash = %entry.input_hash,
            embedded = entry.input_embedding.is_some(),
            "Cached tool result"
        );
        Ok(entry)
    }

    /// Output of the newest live invocation with identical input
    pub async fn get_exact_match(
        &self,
        conversation_id: &str,
        tool_name: &str,
        input: &Value,
    ) -> Option<Value> {
        let input_params = canonical_json(input);
        let lookup = self
            .store
            .find_exact(conversation_id, tool_name, &input_params, Utc::now());

        match timed("find_exact", self.store_timeout, lookup).await {
            Ok(Some(entry)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(conversation_id = %conversation_id, tool = %tool_name, "Tool cache hit");
                Some(entry.output())
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(
                    conversation_id = %conversation_id,
                    tool = %tool_name,
                    error = %e,
                    "Tool cache lookup failed"
                );
                None
            }
        }
    }

    /// Rank live invocations of a conversation against a free-text query.
    ///
    /// Falls back to substring matching at a fixed score when the query
    /// cannot be embedded.
    pub async fn search(
        &self,
        conversation_id: &str,
        query: &str,
        options: &ToolSearchOptions,
    ) -> Vec<ToolCacheHit> {
        if let Err(e) = self.purge_expired().await {
            warn!(error = %e, "Expired tool result purge failed");
        }

        let query = query.trim();
        if query.is_empty() || options.limit == 0 {
            return Vec::new();
        }

        let listing = self
            .store
            .list_live(conversation_id, options.tool_name.as_deref(), Utc::now());
        let live = match timed("list_live", self.store_timeout, listing).await {
            Ok(live) => live,
            Err(e) => {
                warn!(conversation_id = %conversation_id, error = %e, "Tool cache search failed");
                return Vec::new();
            }
        };

        let hits = match self.gateway.embed_query(query).await {
            Some(query_embedding) => rank_by_similarity(
                &query_embedding,
                live,
                options.similarity_threshold,
                options.limit,
            ),
            None => substring_matches(query, live, self.config.fallback_score, options.limit),
        };

        debug!(conversation_id = %conversation_id, hits = hits.len(), "Tool cache search");
        hits
    }

    /// Drop every cached result of a conversation
    pub async fn clear_conversation(&self, conversation_id: &str) -> MemoryResult<usize> {
        let removed = timed(
            "delete_conversation",
            self.store_timeout,
            self.store.delete_conversation(conversation_id),
        )
        .await?;
        info!(conversation_id = %conversation_id, removed, "Cleared tool cache");
        Ok(removed)
    }

    /// Physically remove expired rows across all conversations
    pub async fn purge_expired(&self) -> MemoryResult<usize> {
        let removed = timed(
            "delete_expired",
            self.store_timeout,
            self.store.delete_expired(Utc::now()),
        )
        .await?;
        if removed > 0 {
            debug!(removed, "Purged expired tool results");
        }
        Ok(removed)
    }

    /// Rows stored for a conversation, including expired ones not yet purged
    pub async fn count(&self, conversation_id: &str) -> MemoryResult<usize> {
        timed(
            "count_tool_results",
            self.store_timeout,
            self.store.count_tool_results(conversation_id),
        )
        .await
    }

    /// Purge expired rows every `tool_cache.sweep_interval_secs`
    pub fn spawn_default_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        let interval = self.config.sweep_interval();
        self.spawn_sweeper(interval)
    }

    /// Purge expired rows every `interval`, starting immediately
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "Tool cache sweeper started");

            loop {
                ticker.tick().await;
                match self.purge_expired().await {
                    Ok(removed) if removed > 0 => {
                        info!(removed, "Sweeper removed expired tool results")
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Sweeper purge failed"),
                }
            }
        })
    }

    pub fn stats(&self) -> ToolCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        ToolCacheStats {
            hits,
            misses,
            hit_rate,
        }
    }
}

fn rank_by_similarity(
    query_embedding: &[f32],
    entries: Vec<ToolCacheEntry>,
    threshold: f32,
    limit: usize,
) -> Vec<ToolCacheHit> {
    let mut hits: Vec<ToolCacheHit> = entries
        .into_iter()
        .filter_map(|entry| {
            let score = cosine_similarity(query_embedding, entry.input_embedding.as_deref()?);
            (score >= threshold).then_some(ToolCacheHit { entry, score })
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    hits
}

fn substring_matches(
    query: &str,
    entries: Vec<ToolCacheEntry>,
    score: f32,
    limit: usize,
) -> Vec<ToolCacheHit> {
    let needle = query.to_lowercase();
    entries
        .into_iter()
        .filter(|e| {
            e.input_params.to_lowercase().contains(&needle)
                || e.output_result.to_lowercase().contains(&needle)
        })
        .take(limit)
        .map(|entry| ToolCacheHit { entry, score })
        .collect()
}
