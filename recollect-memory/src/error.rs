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

//! Memory system error types

use thiserror::Error;

/// Result type for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Errors that can occur in the memory system
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Content below the minimum length
    #[error("Content too short: {len} chars (minimum {min})")]
    ContentTooShort { len: usize, min: usize },

    /// Entry not found
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// Storage error
    #[error("Storage error: {0}")]
    StorageError(String),

    /// A bounded call ran out of time
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Embedding provider error
    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    /// Summarizer error
    #[error("Summarizer error: {0}")]
    SummarizerError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MemoryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, MemoryError::Timeout { .. })
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        MemoryError::SerializationError(e.to_string())
    }
}

impl From<toml::de::Error> for MemoryError {
    fn from(e: toml::de::Error) -> Self {
        MemoryError::ConfigError(e.to_string())
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(e: rusqlite::Error) -> Self {
        MemoryError::StorageError(e.to_string())
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(e: tokio::task::JoinError) -> Self {
        MemoryError::StorageError(format!("blocking task failed: {}", e))
    }
}

impl From<reqwest::Error> for MemoryError {
    fn from(e: reqwest::Error) -> Self {
        MemoryError::EmbeddingError(e.to_string())
    }
}
