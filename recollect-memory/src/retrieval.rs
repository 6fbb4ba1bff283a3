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

//! Hybrid retrieval over a single scope
//!
//! Three tiers, each filling only the budget the previous ones left:
//!
//! 1. **Exact**: case-insensitive substring match, score 1.0
//! 2. **Semantic**: cosine similarity of the query embedding, kept above a threshold
//! 3. **Fuzzy**: any query word (longer than two characters) appears in the content
//!
//! Results are stably sorted by score, so an exact 1.0 always stays ahead of
//! a semantic 1.0.

use crate::config::MemoryConfig;
use crate::embedding::EmbeddingGateway;
use crate::error::MemoryResult;
use crate::storage::{timed, FactStore};
use recollect_core::{cosine_similarity_opt, Entry, EntryId, MatchKind, ScoredEntry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Which tiers a search runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Exact,
    Semantic,
    Fuzzy,
    #[default]
    Hybrid,
}

/// Search parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Maximum results
    pub limit: usize,
    /// Minimum cosine similarity for the semantic tier
    pub threshold: f32,
    pub strategy: SearchStrategy,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            threshold: 0.7,
            strategy: SearchStrategy::Hybrid,
        }
    }
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

/// Exact/semantic/fuzzy search over a [`FactStore`]
pub struct HybridRetriever {
    store: Arc<dyn FactStore>,
    gateway: Arc<EmbeddingGateway>,
    store_timeout: Duration,
    fuzzy_score: f32,
    defaults: SearchOptions,
}

impl HybridRetriever {
    pub fn new(
        store: Arc<dyn FactStore>,
        gateway: Arc<EmbeddingGateway>,
        config: &MemoryConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            store_timeout: config.storage.timeout(),
            fuzzy_score: config.retrieval.fuzzy_score,
            defaults: SearchOptions {
                limit: config.retrieval.default_limit,
                threshold: config.retrieval.similarity_threshold,
                strategy: SearchStrategy::Hybrid,
            },
        }
    }

    /// Options built from the configured limit and threshold
    pub fn default_options(&self) -> SearchOptions {
        self.defaults
    }

    /// Search one scope. Storage failures are logged and yield no results.
    pub async fn search(
        &self,
        query: &str,
        scope: &str,
        options: &SearchOptions,
    ) -> Vec<ScoredEntry> {
        let query = query.trim();
        if query.is_empty() || options.limit == 0 {
            return Vec::new();
        }

        let entries = match self.scan(scope).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(scope = %scope, error = %e, "Search scan failed, returning no results");
                return Vec::new();
            }
        };

        let results = self.rank(query, &entries, options).await;
        debug!(
            scope = %scope,
            strategy = ?options.strategy,
            scanned = entries.len(),
            returned = results.len(),
            "Search complete"
        );
        results
    }

    /// Semantic tier only, for a pre-computed embedding. Errors propagate.
    pub async fn semantic_matches(
        &self,
        scope: &str,
        embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> MemoryResult<Vec<ScoredEntry>> {
        let entries = timed(
            "scan_embedded_facts",
            self.store_timeout,
            self.store.scan_embedded_facts(scope),
        )
        .await?;
        Ok(semantic_pass(embedding, &entries, threshold, &HashSet::new(), limit))
    }

    async fn scan(&self, scope: &str) -> MemoryResult<Vec<Entry>> {
        timed("scan_facts", self.store_timeout, self.store.scan_facts(scope)).await
    }

    async fn rank(
        &self,
        query: &str,
        entries: &[Entry],
        options: &SearchOptions,
    ) -> Vec<ScoredEntry> {
        let limit = options.limit;
        let none = HashSet::new();

        let mut results = match options.strategy {
            SearchStrategy::Exact => exact_pass(query, entries, limit),
            SearchStrategy::Semantic => match self.gateway.embed_query(query).await {
                Some(q) => semantic_pass(&q, entries, options.threshold, &none, limit),
                None => Vec::new(),
            },
            SearchStrategy::Fuzzy => fuzzy_pass(query, entries, self.fuzzy_score, &none, limit),
            SearchStrategy::Hybrid => {
                let mut results = exact_pass(query, entries, limit);
                let exact = results.len();

                if results.len() < limit {
                    if let Some(q) = self.gateway.embed_query(query).await {
                        let selected = selected_ids(&results);
                        let budget = limit - results.len();
                        let threshold = options.threshold;
                        results.extend(semantic_pass(&q, entries, threshold, &selected, budget));
                    }
                }
                let semantic = results.len() - exact;

                if results.len() < limit {
                    let selected = selected_ids(&results);
                    let budget = limit - results.len();
                    results.extend(fuzzy_pass(query, entries, self.fuzzy_score, &selected, budget));
                }
                debug!(exact, semantic, fuzzy = results.len() - exact - semantic, "Hybrid tiers");
                results
            }
        };

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);
        results
    }
}

fn selected_ids(results: &[ScoredEntry]) -> HashSet<EntryId> {
    results.iter().map(|r| r.entry.id.clone()).collect()
}

/// Case-insensitive substring matches, in store order
pub(crate) fn exact_pass(query: &str, entries: &[Entry], limit: usize) -> Vec<ScoredEntry> {
    let needle = query.to_lowercase();
    entries
        .iter()
        .filter(|e| e.content.to_lowercase().contains(&needle))
        .take(limit)
        .map(|e| ScoredEntry::new(e.clone(), 1.0, MatchKind::Exact))
        .collect()
}

/// Entries whose embedding scores at least `threshold`, best first
pub(crate) fn semantic_pass(
    query_embedding: &[f32],
    entries: &[Entry],
    threshold: f32,
    exclude: &HashSet<EntryId>,
    limit: usize,
) -> Vec<ScoredEntry> {
    let mut scored: Vec<(f32, &Entry)> = entries
        .iter()
        .filter(|e| e.has_embedding() && !exclude.contains(&e.id))
        .filter_map(|e| {
            let score = cosine_similarity_opt(Some(query_embedding), e.embedding.as_deref());
            (score >= threshold).then_some((score, e))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(limit)
        .map(|(score, e)| ScoredEntry::new(e.clone(), score, MatchKind::Semantic))
        .collect()
}

/// Entries containing any significant query word, at a fixed score
pub(crate) fn fuzzy_pass(
    query: &str,
    entries: &[Entry],
    score: f32,
    exclude: &HashSet<EntryId>,
    limit: usize,
) -> Vec<ScoredEntry> {
    let words = query_words(query);
    if words.is_empty() {
        return Vec::new();
    }

    entries
        .iter()
        .filter(|e| !exclude.contains(&e.id))
        .filter(|e| {
            let content = e.content.to_lowercase();
            words.iter().any(|w| content.contains(w.as_str()))
        })
        .take(limit)
        .map(|e| ScoredEntry::new(e.clone(), score, MatchKind::Fuzzy))
        .collect()
}

/// Lowercased query words longer than two characters, punctuation trimmed
pub(crate) fn query_words(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.chars().count() > 2)
        .collect()
}
