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

//! Storage interfaces for facts and tool results
//!
//! Stores are plain row stores: no similarity logic lives here. Callers
//! bound every call with [`timed`].

use crate::error::{MemoryError, MemoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use recollect_core::{Entry, EntryId, ToolCacheEntry};
use std::future::Future;
use std::time::Duration;

/// Persistent fact store, partitioned by scope
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Insert a new entry
    async fn insert_fact(&self, entry: &Entry) -> MemoryResult<()>;

    /// All entries of a scope, newest first
    async fn scan_facts(&self, scope: &str) -> MemoryResult<Vec<Entry>>;

    /// Entries of a scope that carry an embedding, newest first
    async fn scan_embedded_facts(&self, scope: &str) -> MemoryResult<Vec<Entry>>;

    /// A single entry of a scope
    async fn get_fact(&self, scope: &str, id: &EntryId) -> MemoryResult<Option<Entry>>;

    /// Replace content, embedding, metadata and `updated_at` of an entry.
    /// Returns false when no such entry exists in the entry's scope.
    async fn update_fact(&self, entry: &Entry) -> MemoryResult<bool>;

    /// Delete one entry. Returns false when it did not exist.
    async fn delete_fact(&self, scope: &str, id: &EntryId) -> MemoryResult<bool>;

    /// Delete every entry of a scope
    async fn delete_scope(&self, scope: &str) -> MemoryResult<usize>;
}

/// Persistent tool-result store
#[async_trait]
pub trait ToolCacheStore: Send + Sync {
    async fn insert_tool_result(&self, entry: &ToolCacheEntry) -> MemoryResult<()>;

    /// Newest live entry whose canonical input equals `input_params`
    async fn find_exact(
        &self,
        conversation_id: &str,
        tool_name: &str,
        input_params: &str,
        now: DateTime<Utc>,
    ) -> MemoryResult<Option<ToolCacheEntry>>;

    /// Live entries of a conversation, newest first
    async fn list_live(
        &self,
        conversation_id: &str,
        tool_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> MemoryResult<Vec<ToolCacheEntry>>;

    /// Physically remove entries with `expires_at <= now`
    async fn delete_expired(&self, now: DateTime<Utc>) -> MemoryResult<usize>;

    async fn delete_conversation(&self, conversation_id: &str) -> MemoryResult<usize>;

    /// Rows stored for a conversation, expired ones included
    async fn count_tool_results(&self, conversation_id: &str) -> MemoryResult<usize>;
}

/// Run a store call under a deadline
pub async fn timed<T, F>(operation: &'static str, limit: Duration, fut: F) -> MemoryResult<T>
where
    F: Future<Output = MemoryResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(MemoryError::Timeout {
            operation,
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}
