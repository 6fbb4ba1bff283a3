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

//! Memoized tool invocations
//!
//! A tool cache entry records one successful invocation within a
//! conversation. Inputs are stored in canonical JSON so that two calls with
//! the same arguments in a different key order hit the same row.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A cached tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCacheEntry {
    pub id: String,
    pub conversation_id: String,
    pub tool_name: String,
    /// Canonical JSON of the tool input
    pub input_params: String,
    /// Hash of `input_params`, used as the lookup index
    pub input_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_embedding: Option<Vec<f32>>,
    /// Serialized tool output, opaque to the cache
    pub output_result: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ToolCacheEntry {
    /// Build a new entry expiring `ttl` after now.
    ///
    /// A `ttl` past the representable range never expires.
    pub fn new(
        conversation_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: &Value,
        output: &Value,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        let input_params = canonical_json(input);
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            tool_name: tool_name.into(),
            input_hash: input_hash(&input_params),
            input_params,
            input_embedding: None,
            output_result: canonical_json(output),
            metadata: Value::Null,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Whether the entry is still live at `now`
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Parse the stored output back into JSON.
    ///
    /// Outputs that were stored as non-JSON text come back as a JSON string.
    pub fn output(&self) -> Value {
        serde_json::from_str(&self.output_result)
            .unwrap_or_else(|_| Value::String(self.output_result.clone()))
    }
}

/// Serialize a JSON value with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Short stable hash of canonical input params
pub fn input_hash(canonical: &str) -> String {
    let hash = blake3::hash(canonical.as_bytes());
    hex::encode(&hash.as_bytes()[..8])
}
