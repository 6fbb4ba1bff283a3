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

//! Recollect Core
//!
//! Fundamental data structures shared by the memory layer:
//! - **Entries**: scoped free-text facts and prompt fragments
//! - **Tool cache entries**: memoized tool invocations per conversation
//! - **Similarity kernel**: total cosine similarity over `f32` vectors
//! - **Embedding codec**: the canonical on-disk vector encoding

pub mod codec;
pub mod entry;
pub mod metadata;
pub mod similarity;
pub mod tool;

pub use codec::{
    decode_embedding, decode_legacy_embedding, decode_text_embedding, encode_embedding, CodecError,
};
pub use entry::{Entry, EntryId, MatchKind, ScoredEntry, SYSTEM_SCOPE};
pub use metadata::{EntryMetadata, Priority, AGENT_TYPE_ALL, DEFAULT_CATEGORY};
pub use similarity::{cosine_similarity, cosine_similarity_opt};
pub use tool::{canonical_json, input_hash, ToolCacheEntry};
