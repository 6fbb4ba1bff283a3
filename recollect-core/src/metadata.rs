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

//! Typed entry metadata
//!
//! Category, priority and agent-type routing are the only fields the memory
//! layer interprets. Everything else rides along in `extra`.

use serde::{Deserialize, Serialize};

/// Category assigned when none is given
pub const DEFAULT_CATEGORY: &str = "general";

/// Agent type that matches every consumer
pub const AGENT_TYPE_ALL: &str = "all";

/// Priority of an entry when assembling context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

impl Priority {
    /// Weight used when ordering context sections
    pub fn weight(self) -> u32 {
        match self {
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

/// Metadata attached to an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Section the entry is grouped under
    #[serde(default = "default_category")]
    pub category: String,
    /// Ordering priority
    #[serde(default)]
    pub priority: Priority,
    /// Consumer this entry is meant for ("all" for everyone)
    #[serde(default = "default_agent_type")]
    pub agent_type: String,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Uninterpreted flags
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_agent_type() -> String {
    AGENT_TYPE_ALL.to_string()
}

impl Default for EntryMetadata {
    fn default() -> Self {
        Self {
            category: default_category(),
            priority: Priority::default(),
            agent_type: default_agent_type(),
            tags: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl EntryMetadata {
    /// Metadata in a category
    pub fn category(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..Default::default()
        }
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Route to a single agent type
    pub fn for_agent(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }

    /// Apply defaults to blank fields, trim and lowercase routing keys,
    /// and drop empty or duplicate tags.
    pub fn normalized(mut self) -> Self {
        let category = self.category.trim().to_lowercase();
        self.category = if category.is_empty() {
            default_category()
        } else {
            category
        };

        let agent_type = self.agent_type.trim().to_lowercase();
        self.agent_type = if agent_type.is_empty() {
            default_agent_type()
        } else {
            agent_type
        };

        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in self.tags.drain(..) {
            let tag = tag.trim().to_string();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        self.tags = tags;
        self
    }

    /// Whether this entry is visible to the given agent type
    pub fn visible_to(&self, agent_type: &str) -> bool {
        self.agent_type == AGENT_TYPE_ALL || self.agent_type.eq_ignore_ascii_case(agent_type)
    }
}
