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

//! Context assembly
//!
//! Turns retrieval hits into a markdown prompt fragment: hits are filtered
//! by score and agent type, grouped by category, ordered by priority, and
//! packed into a token budget. [`PromptContextBuilder`] puts a
//! [`ContextCache`] in front of the search-and-assemble round trip.

use crate::config::{ContextCacheConfig, MemoryConfig, SummarizerConfig};
use crate::context_cache::{ContextCache, ContextCacheKey};
use crate::facts::FactMemory;
use crate::summarizer::Summarizer;
use recollect_core::ScoredEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sections smaller than this are dropped rather than cut
const MIN_PARTIAL_TOKENS: usize = 25;

/// Filtering and packing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyRequest {
    /// Consumer the context is for; `None` keeps every agent type
    pub agent_type: Option<String>,
    /// Hits below this score are dropped
    pub min_score: f32,
    /// Maximum tokens in the rendered content
    pub token_budget: usize,
}

impl Default for AssemblyRequest {
    fn default() -> Self {
        Self {
            agent_type: None,
            min_score: 0.5,
            token_budget: 2_000,
        }
    }
}

impl AssemblyRequest {
    pub fn for_agent(agent_type: impl Into<String>) -> Self {
        Self {
            agent_type: Some(agent_type.into()),
            ..Default::default()
        }
    }

    pub fn min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn token_budget(mut self, budget: usize) -> Self {
        self.token_budget = budget;
        self
    }
}

/// Hits sharing a category
#[derive(Debug, Clone)]
pub struct ContextSection {
    pub category: String,
    /// Ordered by priority, then score
    pub entries: Vec<ScoredEntry>,
    /// Sum of the entries' priority weights
    pub weight: u32,
    pub best_score: f32,
}

/// Rendered context ready for a prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// Markdown content
    pub content: String,
    /// Categories included, in render order
    pub sections: Vec<String>,
    /// Entries rendered
    pub fragment_count: usize,
    /// Approximate token count
    pub token_count: usize,
    /// Whether content was cut to fit the budget
    pub truncated: bool,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Groups and packs retrieval hits
pub struct ContextAssembler {
    /// Approximate tokens per character (for estimation)
    tokens_per_char: f32,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextAssembler {
    pub fn new() -> Self {
        Self {
            tokens_per_char: 0.25,
        }
    }

    /// Filter hits and group them into ordered sections
    pub fn categorize(
        &self,
        hits: Vec<ScoredEntry>,
        request: &AssemblyRequest,
    ) -> Vec<ContextSection> {
        let mut groups: BTreeMap<String, Vec<ScoredEntry>> = BTreeMap::new();

        for hit in hits {
            if hit.score < request.min_score {
                continue;
            }
            if let Some(agent_type) = &request.agent_type {
                if !hit.entry.metadata.visible_to(agent_type) {
                    continue;
                }
            }
            groups
                .entry(hit.entry.metadata.category.clone())
                .or_default()
                .push(hit);
        }

        let mut sections: Vec<ContextSection> = groups
            .into_iter()
            .map(|(category, mut entries)| {
                entries.sort_by(|a, b| {
                    b.entry
                        .metadata
                        .priority
                        .cmp(&a.entry.metadata.priority)
                        .then(b.score.total_cmp(&a.score))
                });
                let weight = entries.iter().map(|e| e.entry.metadata.priority.weight()).sum();
                let best_score = entries.iter().map(|e| e.score).fold(f32::MIN, f32::max);
                ContextSection {
                    category,
                    entries,
                    weight,
                    best_score,
                }
            })
            .collect();

        sections.sort_by(|a, b| {
            b.weight
                .cmp(&a.weight)
                .then(b.best_score.total_cmp(&a.best_score))
                .then(a.category.cmp(&b.category))
        });
        sections
    }

    /// Categorize and render within the token budget
    pub fn assemble(&self, hits: Vec<ScoredEntry>, request: &AssemblyRequest) -> AssembledContext {
        let sections = self.categorize(hits, request);

        let mut rendered: Vec<String> = Vec::new();
        let mut included = Vec::new();
        let mut fragment_count = 0;
        let mut total_tokens = 0;
        let mut truncated = false;

        for section in &sections {
            let content = render_section(section);
            let section_tokens = self.estimate_tokens(&content);

            if total_tokens + section_tokens <= request.token_budget {
                total_tokens += section_tokens;
                fragment_count += section.entries.len();
                included.push(section.category.clone());
                rendered.push(content);
            } else {
                let remaining = request.token_budget.saturating_sub(total_tokens);
                if remaining > MIN_PARTIAL_TOKENS {
                    let partial = self.truncate_to_tokens(&content, remaining);
                    let kept = partial.lines().filter(|l| l.starts_with("- ")).count();
                    // A heading with no entries under it is not worth the tokens
                    if kept > 0 {
                        total_tokens += self.estimate_tokens(&partial);
                        fragment_count += kept;
                        included.push(section.category.clone());
                        rendered.push(partial);
                    }
                }
                truncated = true;
                break;
            }
        }

        AssembledContext {
            content: rendered.join("\n"),
            sections: included,
            fragment_count,
            token_count: total_tokens,
            truncated,
        }
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        (text.chars().count() as f32 * self.tokens_per_char).ceil() as usize
    }

    fn truncate_to_tokens(&self, text: &str, max_tokens: usize) -> String {
        // Leave room for the ellipsis
        let max_chars = ((max_tokens as f32 / self.tokens_per_char) as usize).saturating_sub(3);
        let cut = match text.char_indices().nth(max_chars) {
            Some((idx, _)) => &text[..idx],
            None => return text.to_string(),
        };
        match cut.rfind('\n') {
            Some(pos) => format!("{}...", &cut[..pos]),
            None => format!("{}...", cut),
        }
    }
}

fn render_section(section: &ContextSection) -> String {
    let mut content = format!("## {}\n\n", section_title(&section.category));
    for hit in &section.entries {
        content.push_str(&format!("- {}\n", hit.entry.content.trim()));
    }
    content
}

/// `shipping_policy` -> `Shipping Policy`
fn section_title(category: &str) -> String {
    category
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cached prompt context and history summaries for a consumer
pub struct PromptContextBuilder {
    facts: Arc<FactMemory>,
    assembler: ContextAssembler,
    cache: ContextCache<AssembledContext>,
    summarizer: Option<Arc<dyn Summarizer>>,
    config: ContextCacheConfig,
    summarizer_config: SummarizerConfig,
}

impl PromptContextBuilder {
    pub fn new(
        facts: Arc<FactMemory>,
        summarizer: Option<Arc<dyn Summarizer>>,
        config: &MemoryConfig,
    ) -> Self {
        Self {
            facts,
            assembler: ContextAssembler::new(),
            cache: ContextCache::from_config(&config.context_cache),
            summarizer,
            config: config.context_cache.clone(),
            summarizer_config: config.summarizer.clone().unwrap_or_default(),
        }
    }

    pub fn cache(&self) -> &ContextCache<AssembledContext> {
        &self.cache
    }

    /// Context for `consumer`, served from the cache while fresh.
    ///
    /// Empty results are not cached, so a failed search is retried on the
    /// next call.
    pub async fn build(&self, query: &str, scope: &str, consumer: &str) -> AssembledContext {
        let consumer = consumer.trim();
        let key = ContextCacheKey::new(query, consumer, scope, self.config.key_prefix_chars);
        if let Some(cached) = self.cache.get(&key) {
            debug!(scope = %scope, consumer = %consumer, "Context cache hit");
            return cached;
        }

        let options = self
            .facts
            .retriever()
            .default_options()
            .with_limit(self.config.fragment_limit);
        let hits = self.facts.search(query, scope, &options).await;

        let request = AssemblyRequest {
            agent_type: (!consumer.is_empty()).then(|| consumer.to_string()),
            min_score: self.config.min_score,
            token_budget: self.config.token_budget,
        };
        let assembled = self.assembler.assemble(hits, &request);

        if !assembled.is_empty() {
            self.cache.put(key, assembled.clone());
        }
        debug!(
            scope = %scope,
            consumer = %consumer,
            fragments = assembled.fragment_count,
            tokens = assembled.token_count,
            "Assembled context"
        );
        assembled
    }

    /// Short summary of what the scope remembers about `query`.
    ///
    /// Without a working summarizer the top entries are returned as bullets.
    pub async fn summarize_history(&self, query: &str, scope: &str) -> String {
        let options = self
            .facts
            .retriever()
            .default_options()
            .with_limit(self.summarizer_config.history_limit);
        let hits = self.facts.search(query, scope, &options).await;
        if hits.is_empty() {
            return String::new();
        }

        if let Some(summarizer) = &self.summarizer {
            let prompt = summary_prompt(query, &hits);
            let timeout = self.summarizer_config.timeout();
            match tokio::time::timeout(timeout, summarizer.summarize(&prompt)).await {
                Ok(Ok(summary)) => return summary,
                Ok(Err(e)) => {
                    warn!(scope = %scope, error = %e, "Summarizer failed, using bullets")
                }
                Err(_) => warn!(
                    scope = %scope,
                    timeout_ms = timeout.as_millis() as u64,
                    "Summarizer timed out, using bullets"
                ),
            }
        }

        hits.iter()
            .take(self.summarizer_config.fallback_entries)
            .map(|h| format!("- {}", h.entry.content.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn summary_prompt(query: &str, hits: &[ScoredEntry]) -> String {
    let mut prompt = format!("Topic: {}\n\nNotes:\n", query.trim());
    for hit in hits {
        prompt.push_str(&format!("- {}\n", hit.entry.content.trim()));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::EmbeddingGateway;
    use crate::error::MemoryResult;
    use crate::sqlite::SqliteStore;
    use crate::testing::{FailingSummarizer, HashingEmbedder, StaticSummarizer};
    use async_trait::async_trait;
    use recollect_core::{Entry, EntryMetadata, MatchKind, Priority, SYSTEM_SCOPE};

    fn hit(
        content: &str,
        category: &str,
        priority: Priority,
        agent: &str,
        score: f32,
    ) -> ScoredEntry {
        let metadata = EntryMetadata::category(category)
            .with_priority(priority)
            .for_agent(agent);
        ScoredEntry::new(
            Entry::new(SYSTEM_SCOPE, content).metadata(metadata),
            score,
            MatchKind::Semantic,
        )
    }

    #[test]
    fn test_section_title() {
        assert_eq!(section_title("shipping_policy"), "Shipping Policy");
        assert_eq!(section_title("faq"), "Faq");
    }

    #[test]
    fn test_categorize_filters_and_orders() {
        let hits = vec![
            hit("Free returns within 30 days", "returns", Priority::Medium, "all", 0.9),
            hit("Express shipping costs extra", "shipping", Priority::High, "all", 0.8),
            hit("Ships within two days", "shipping", Priority::Low, "all", 0.95),
            hit("Sales-only upsell script", "sales", Priority::High, "sales", 0.99),
            hit("Barely relevant note", "returns", Priority::High, "all", 0.2),
        ];

        let sections =
            ContextAssembler::new().categorize(hits, &AssemblyRequest::for_agent("support"));

        let names: Vec<_> = sections.iter().map(|s| s.category.as_str()).collect();
        assert_eq!(names, vec!["shipping", "returns"]);
        assert_eq!(sections[0].weight, 4);
        // High priority before a better-scoring low priority entry
        assert_eq!(sections[0].entries[0].entry.content, "Express shipping costs extra");
        assert_eq!(sections[1].entries.len(), 1);
    }

    #[test]
    fn test_categorize_without_agent_keeps_all() {
        let hits = vec![
            hit("Sales-only upsell script", "sales", Priority::High, "sales", 0.99),
            hit("Support macro for refunds", "support", Priority::High, "support", 0.9),
        ];
        let sections = ContextAssembler::new().categorize(hits, &AssemblyRequest::default());
        assert_eq!(sections.len(), 2);
        // Equal weight, higher best score first
        assert_eq!(sections[0].category, "sales");
    }

    #[test]
    fn test_assemble_renders_markdown() {
        let hits = vec![
            hit("Free returns within 30 days", "returns", Priority::Medium, "all", 0.9),
            hit("Express shipping costs extra", "shipping_policy", Priority::High, "all", 0.8),
        ];
        let ctx = ContextAssembler::new().assemble(hits, &AssemblyRequest::default());

        assert_eq!(
            ctx.content,
            "## Shipping Policy\n\n- Express shipping costs extra\n\n## Returns\n\n- Free returns within 30 days\n"
        );
        assert_eq!(ctx.sections, vec!["shipping_policy", "returns"]);
        assert_eq!(ctx.fragment_count, 2);
        assert!(!ctx.truncated);
        assert!(ctx.token_count > 0);
    }

    #[test]
    fn test_assemble_respects_budget() {
        let long = "x".repeat(400);
        let hits = vec![
            hit(&long, "a", Priority::High, "all", 0.9),
            hit(&long, "b", Priority::Medium, "all", 0.9),
            hit(&long, "c", Priority::Low, "all", 0.9),
        ];
        let request = AssemblyRequest::default().token_budget(150);
        let ctx = ContextAssembler::new().assemble(hits, &request);

        assert!(ctx.truncated);
        assert!(ctx.token_count <= 150);
        assert_eq!(ctx.sections, vec!["a"]);

        let empty = ContextAssembler::new().assemble(Vec::new(), &AssemblyRequest::default());
        assert!(empty.is_empty());
        assert!(!empty.truncated);
    }

    struct HangingSummarizer;

    #[async_trait]
    impl Summarizer for HangingSummarizer {
        async fn summarize(&self, _prompt: &str) -> MemoryResult<String> {
            std::future::pending().await
        }
    }

    async fn builder(
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> (PromptContextBuilder, Arc<FactMemory>) {
        builder_with(summarizer, MemoryConfig::default()).await
    }

    async fn builder_with(
        summarizer: Option<Arc<dyn Summarizer>>,
        config: MemoryConfig,
    ) -> (PromptContextBuilder, Arc<FactMemory>) {
        let gateway = Arc::new(EmbeddingGateway::new(
            Arc::new(HashingEmbedder::new()),
            &EmbeddingConfig::default(),
        ));
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let facts = Arc::new(FactMemory::new(store, gateway, &config));

        facts
            .add(
                "Express shipping arrives next day",
                SYSTEM_SCOPE,
                EntryMetadata::category("shipping").with_priority(Priority::High),
            )
            .await
            .unwrap();
        facts
            .add(
                "Standard shipping takes five days",
                SYSTEM_SCOPE,
                EntryMetadata::category("shipping").for_agent("support"),
            )
            .await
            .unwrap();
        facts
            .add(
                "Upsell shipping insurance at checkout",
                SYSTEM_SCOPE,
                EntryMetadata::category("sales").for_agent("sales"),
            )
            .await
            .unwrap();

        (PromptContextBuilder::new(Arc::clone(&facts), summarizer, &config), facts)
    }

    #[tokio::test]
    async fn test_build_filters_by_consumer_and_caches() {
        let (builder, facts) = builder(None).await;

        let ctx = builder.build("shipping", SYSTEM_SCOPE, "support").await;
        assert_eq!(ctx.fragment_count, 2);
        assert!(!ctx.content.contains("Upsell"));
        assert_eq!(builder.cache().len(), 1);

        // Served from the cache even after the store changes
        facts.delete_all(SYSTEM_SCOPE).await.unwrap();
        let cached = builder.build("shipping", SYSTEM_SCOPE, "support").await;
        assert_eq!(cached, ctx);

        // Surrounding whitespace in the consumer shares the slot
        let padded = builder.build("shipping", SYSTEM_SCOPE, "  support ").await;
        assert_eq!(padded, ctx);
        assert_eq!(builder.cache().len(), 1);

        // A different consumer misses the cache
        let sales = builder.build("shipping", SYSTEM_SCOPE, "sales").await;
        assert!(sales.is_empty());
        assert_eq!(builder.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_summarize_history_with_summarizer() {
        let summarizer: Arc<dyn Summarizer> = Arc::new(StaticSummarizer::new("Ships fast."));
        let (builder, _) = builder(Some(summarizer)).await;
        assert_eq!(builder.summarize_history("shipping", SYSTEM_SCOPE).await, "Ships fast.");
    }

    #[tokio::test]
    async fn test_summarize_history_falls_back_to_bullets() {
        let (failing, _) = builder(Some(Arc::new(FailingSummarizer))).await;
        let summary = failing.summarize_history("shipping", SYSTEM_SCOPE).await;
        assert_eq!(summary.lines().count(), 3);
        assert!(summary.lines().all(|l| l.starts_with("- ")));

        let (plain, _) = builder(None).await;
        assert_eq!(plain.summarize_history("shipping", SYSTEM_SCOPE).await.lines().count(), 3);
        assert!(plain.summarize_history("warranty", SYSTEM_SCOPE).await.is_empty());
    }

    #[tokio::test]
    async fn test_summarize_history_falls_back_on_timeout() {
        let mut config = MemoryConfig::default();
        config.summarizer = Some(SummarizerConfig {
            timeout_ms: 50,
            ..SummarizerConfig::default()
        });
        let (builder, _) = builder_with(Some(Arc::new(HangingSummarizer)), config).await;

        let summary = builder.summarize_history("shipping", SYSTEM_SCOPE).await;
        assert_eq!(summary.lines().count(), 3);
        assert!(summary.lines().all(|l| l.starts_with("- ")));
        assert!(summary.contains("Express shipping arrives next day"));
    }
}
