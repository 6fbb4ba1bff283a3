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

//! Entries and scored search results
//!
//! An entry is the atomic unit of memory: a piece of free text owned by a
//! scope (a user, a conversation, or the reserved system namespace holding
//! prompt fragments). Entries never leak across scopes.

use crate::metadata::EntryMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved scope for prompt fragments
pub const SYSTEM_SCOPE: &str = "__system__";

/// Unique identifier for an entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub String);

impl EntryId {
    /// Generate a new unique ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored fact or prompt fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique entry ID
    pub id: EntryId,
    /// Owning scope
    pub scope: String,
    /// Entry text
    pub content: String,
    /// Embedding vector, absent when the provider failed at write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Typed metadata
    #[serde(default)]
    pub metadata: EntryMetadata,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// When the entry was last explicitly updated
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    /// Create a new entry in a scope
    pub fn new(scope: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EntryId::new(),
            scope: scope.into(),
            content: content.into(),
            embedding: None,
            metadata: EntryMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the embedding
    pub fn embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = embedding;
        self
    }

    /// Set the metadata
    pub fn metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().map(|e| !e.is_empty()).unwrap_or(false)
    }

    /// Short content hash, used in logs
    pub fn content_hash(&self) -> String {
        let hash = blake3::hash(self.content.as_bytes());
        hex::encode(&hash.as_bytes()[..8])
    }
}

/// Which retrieval tier produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Semantic,
    Fuzzy,
}

/// An entry with its retrieval score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub entry: Entry,
    pub score: f32,
    pub match_kind: MatchKind,
}

impl ScoredEntry {
    pub fn new(entry: Entry, score: f32, match_kind: MatchKind) -> Self {
        Self {
            entry,
            score,
            match_kind,
        }
    }
}
