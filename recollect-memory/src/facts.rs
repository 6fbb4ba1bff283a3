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

//! Scoped fact memory with write-time deduplication

use crate::config::{MemoryConfig, RetrievalConfig};
use crate::embedding::EmbeddingGateway;
use crate::error::{MemoryError, MemoryResult};
use crate::retrieval::{HybridRetriever, SearchOptions};
use crate::storage::{timed, FactStore};
use chrono::Utc;
use recollect_core::{Entry, EntryId, EntryMetadata, ScoredEntry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of [`FactMemory::add_detailed`]
#[derive(Debug, Clone)]
pub struct AddOutcome {
    /// The stored entry, or the existing one the content collapsed onto
    pub entry: Entry,
    /// True when no new row was written
    pub deduplicated: bool,
}

/// Changes applied by [`FactMemory::update`]
#[derive(Debug, Clone, Default)]
pub struct FactUpdate {
    pub content: Option<String>,
    pub metadata: Option<EntryMetadata>,
}

/// Facts partitioned by scope.
///
/// `add` embeds the content once and, when an existing fact in the same
/// scope scores at or above the dedup threshold, returns that fact instead
/// of writing a new one.
///
/// The check and the insert are not atomic. Two concurrent `add` calls with
/// near-identical content may both miss each other and both insert.
pub struct FactMemory {
    store: Arc<dyn FactStore>,
    gateway: Arc<EmbeddingGateway>,
    retriever: HybridRetriever,
    config: RetrievalConfig,
    store_timeout: Duration,
}

impl FactMemory {
    pub fn new(
        store: Arc<dyn FactStore>,
        gateway: Arc<EmbeddingGateway>,
        config: &MemoryConfig,
    ) -> Self {
        Self {
            retriever: HybridRetriever::new(Arc::clone(&store), Arc::clone(&gateway), config),
            store,
            gateway,
            config: config.retrieval.clone(),
            store_timeout: config.storage.timeout(),
        }
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    /// Add a fact, or return the existing near-duplicate
    pub async fn add(
        &self,
        content: &str,
        scope: &str,
        metadata: EntryMetadata,
    ) -> MemoryResult<Entry> {
        Ok(self.add_detailed(content, scope, metadata).await?.entry)
    }

    pub async fn add_detailed(
        &self,
        content: &str,
        scope: &str,
        metadata: EntryMetadata,
    ) -> MemoryResult<AddOutcome> {
        let content = self.validate_content(content)?;
        let embedding = self.gateway.embed(content).await;

        if let Some(embedding) = embedding.as_deref() {
            match self
                .retriever
                .semantic_matches(scope, embedding, self.config.dedup_threshold, 1)
                .await
            {
                Ok(mut hits) if !hits.is_empty() => {
                    let best = hits.swap_remove(0);
                    info!(
                        scope = %scope,
                        existing_id = %best.entry.id,
                        score = best.score,
                        "Deduplicated fact"
                    );
                    return Ok(AddOutcome {
                        entry: best.entry,
                        deduplicated: true,
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(scope = %scope, error = %e, "Dedup check failed, inserting anyway");
                }
            }
        }

        let entry = Entry::new(scope, content)
            .embedding(embedding)
            .metadata(metadata.normalized());

        timed("insert_fact", self.store_timeout, self.store.insert_fact(&entry)).await?;
        debug!(
            scope = %scope,
            id = %entry.id,
            content_hash = %entry.content_hash(),
            embedded = entry.has_embedding(),
            "Stored fact"
        );

        Ok(AddOutcome {
            entry,
            deduplicated: false,
        })
    }

    /// Hybrid search within a scope
    pub async fn search(
        &self,
        query: &str,
        scope: &str,
        options: &SearchOptions,
    ) -> Vec<ScoredEntry> {
        self.retriever.search(query, scope, options).await
    }

    /// Every fact of a scope, newest first. Storage failures yield an empty list.
    pub async fn get_all(&self, scope: &str) -> Vec<Entry> {
        match timed("scan_facts", self.store_timeout, self.store.scan_facts(scope)).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(scope = %scope, error = %e, "Failed to list facts");
                Vec::new()
            }
        }
    }

    pub async fn get(&self, scope: &str, id: &EntryId) -> Option<Entry> {
        match timed("get_fact", self.store_timeout, self.store.get_fact(scope, id)).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(scope = %scope, id = %id, error = %e, "Failed to load fact");
                None
            }
        }
    }

    /// Replace content and/or metadata of a fact.
    ///
    /// New content is re-embedded. Updates never deduplicate.
    pub async fn update(
        &self,
        scope: &str,
        id: &EntryId,
        update: FactUpdate,
    ) -> MemoryResult<Entry> {
        let mut entry = timed("get_fact", self.store_timeout, self.store.get_fact(scope, id))
            .await?
            .ok_or_else(|| MemoryError::EntryNotFound(id.to_string()))?;

        if let Some(content) = update.content {
            let content = self.validate_content(&content)?;
            if content != entry.content {
                entry.embedding = self.gateway.embed(content).await;
                entry.content = content.to_string();
            }
        }
        if let Some(metadata) = update.metadata {
            entry.metadata = metadata.normalized();
        }
        entry.updated_at = Utc::now();

        let found = timed("update_fact", self.store_timeout, self.store.update_fact(&entry)).await?;
        if !found {
            return Err(MemoryError::EntryNotFound(id.to_string()));
        }
        Ok(entry)
    }

    /// Returns false when the fact did not exist
    pub async fn delete(&self, scope: &str, id: &EntryId) -> MemoryResult<bool> {
        timed("delete_fact", self.store_timeout, self.store.delete_fact(scope, id)).await
    }

    /// Delete every fact in a scope
    pub async fn delete_all(&self, scope: &str) -> MemoryResult<usize> {
        let removed =
            timed("delete_scope", self.store_timeout, self.store.delete_scope(scope)).await?;
        info!(scope = %scope, removed, "Cleared scope");
        Ok(removed)
    }

    fn validate_content<'a>(&self, content: &'a str) -> MemoryResult<&'a str> {
        let trimmed = content.trim();
        let len = trimmed.chars().count();
        if len < self.config.min_content_chars {
            return Err(MemoryError::ContentTooShort {
                len,
                min: self.config.min_content_chars,
            });
        }
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::EmbeddingProvider;
    use crate::sqlite::SqliteStore;
    use crate::testing::{FailingEmbedder, HashingEmbedder, UnavailableStore};
    use recollect_core::Priority;

    fn memory_with(store: Arc<dyn FactStore>, provider: Arc<dyn EmbeddingProvider>) -> FactMemory {
        let config = MemoryConfig::default();
        let gateway = Arc::new(EmbeddingGateway::new(provider, &EmbeddingConfig::default()));
        FactMemory::new(store, gateway, &config)
    }

    fn memory() -> FactMemory {
        memory_with(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(HashingEmbedder::new()),
        )
    }

    #[tokio::test]
    async fn test_add_rejects_short_content() {
        let memory = memory();
        let err = memory
            .add("   short   ", "u1", EntryMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::ContentTooShort { len: 5, min: 10 }));
        assert!(memory.get_all("u1").await.is_empty());
    }

    #[tokio::test]
    async fn test_add_deduplicates() {
        let memory = memory();
        let first = memory
            .add_detailed("The user's name is Pranav.", "u1", EntryMetadata::default())
            .await
            .unwrap();
        let second = memory
            .add_detailed("the user's name is pranav", "u1", EntryMetadata::default())
            .await
            .unwrap();

        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.entry.id, second.entry.id);
        assert_eq!(
            second.entry.created_at.timestamp_millis(),
            first.entry.created_at.timestamp_millis()
        );
        assert_eq!(memory.get_all("u1").await.len(), 1);

        // Other scopes are unaffected
        let other = memory
            .add_detailed("The user's name is Pranav.", "u2", EntryMetadata::default())
            .await
            .unwrap();
        assert!(!other.deduplicated);
    }

    #[tokio::test]
    async fn test_distinct_facts_both_stored() {
        let memory = memory();
        memory
            .add("User prefers dark roast coffee", "u1", EntryMetadata::default())
            .await
            .unwrap();
        memory
            .add("Shipping address is in Pune", "u1", EntryMetadata::default())
            .await
            .unwrap();
        assert_eq!(memory.get_all("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_add_without_embedding_still_stores() {
        let memory = memory_with(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            Arc::new(FailingEmbedder),
        );
        let a = memory
            .add("User prefers dark roast coffee", "u1", EntryMetadata::default())
            .await
            .unwrap();
        let b = memory
            .add("User prefers dark roast coffee", "u1", EntryMetadata::default())
            .await
            .unwrap();

        assert!(!a.has_embedding());
        assert_ne!(a.id, b.id);
        assert_eq!(memory.get_all("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_storage_failure_paths() {
        let memory = memory_with(Arc::new(UnavailableStore), Arc::new(HashingEmbedder::new()));

        let err = memory
            .add("User prefers dark roast coffee", "u1", EntryMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::StorageError(_)));

        assert!(memory.get_all("u1").await.is_empty());
        assert!(memory.get("u1", &EntryId::new()).await.is_none());
        assert!(memory.delete_all("u1").await.is_err());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let memory = memory();
        let entry = memory
            .add("User prefers dark roast coffee", "u1", EntryMetadata::default())
            .await
            .unwrap();

        let updated = memory
            .update(
                "u1",
                &entry.id,
                FactUpdate {
                    content: Some("User prefers light roast tea".into()),
                    metadata: Some(
                        EntryMetadata::category("Preferences").with_priority(Priority::High),
                    ),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.id, entry.id);
        assert_eq!(updated.metadata.category, "preferences");
        assert!(updated.updated_at >= entry.updated_at);
        assert_ne!(updated.embedding, entry.embedding);

        let loaded = memory.get("u1", &entry.id).await.unwrap();
        assert_eq!(loaded.content, "User prefers light roast tea");

        let missing = memory
            .update("u1", &EntryId::new(), FactUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(missing, MemoryError::EntryNotFound(_)));

        let too_short = memory
            .update(
                "u1",
                &entry.id,
                FactUpdate {
                    content: Some("tea".into()),
                    metadata: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(too_short, MemoryError::ContentTooShort { .. }));

        assert!(memory.delete("u1", &entry.id).await.unwrap());
        assert!(!memory.delete("u1", &entry.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_all() {
        let memory = memory();
        memory
            .add("User prefers dark roast coffee", "u1", EntryMetadata::default())
            .await
            .unwrap();
        memory
            .add("Shipping address is in Pune", "u1", EntryMetadata::default())
            .await
            .unwrap();
        assert_eq!(memory.delete_all("u1").await.unwrap(), 2);
        assert!(memory.get_all("u1").await.is_empty());
    }
}
