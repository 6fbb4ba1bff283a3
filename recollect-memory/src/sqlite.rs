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

//! SQLite-backed fact and tool-result store
//!
//! One connection behind a mutex. Every call runs on the blocking pool and
//! takes the lock only inside the blocking closure.
//!
//! Embeddings are stored as packed little-endian `f32` blobs. Rows written
//! by older deployments in another encoding are rewritten once, when the
//! store is opened.

use crate::error::MemoryResult;
use crate::storage::{FactStore, ToolCacheStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use recollect_core::{
    decode_embedding, decode_legacy_embedding, decode_text_embedding, encode_embedding,
    input_hash, Entry, EntryId, EntryMetadata, ToolCacheEntry,
};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS facts (
    id          TEXT PRIMARY KEY,
    scope       TEXT NOT NULL,
    content     TEXT NOT NULL,
    embedding   BLOB,
    metadata    TEXT NOT NULL DEFAULT '{}',
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_facts_scope ON facts (scope, created_at);

CREATE TABLE IF NOT EXISTS tool_cache (
    id               TEXT PRIMARY KEY,
    conversation_id  TEXT NOT NULL,
    tool_name        TEXT NOT NULL,
    input_params     TEXT NOT NULL,
    input_hash       TEXT NOT NULL,
    input_embedding  BLOB,
    output_result    TEXT NOT NULL,
    metadata         TEXT NOT NULL DEFAULT 'null',
    created_at       INTEGER NOT NULL,
    expires_at       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tool_cache_lookup
    ON tool_cache (conversation_id, tool_name, input_hash, created_at);
CREATE INDEX IF NOT EXISTS idx_tool_cache_expires ON tool_cache (expires_at);
"#;

const FACT_COLUMNS: &str = "id, scope, content, embedding, metadata, created_at, updated_at";

const TOOL_COLUMNS: &str = "id, conversation_id, tool_name, input_params, input_hash, \
     input_embedding, output_result, metadata, created_at, expires_at";

/// Rows rewritten by the legacy-embedding migration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Fact embeddings re-encoded in the canonical form
    pub facts_converted: usize,
    /// Fact embeddings that could not be decoded and were cleared
    pub facts_cleared: usize,
    pub tool_converted: usize,
    pub tool_cleared: usize,
}

impl MigrationReport {
    pub fn total(&self) -> usize {
        self.facts_converted + self.facts_cleared + self.tool_converted + self.tool_cleared
    }
}

/// SQLite implementation of [`FactStore`] and [`ToolCacheStore`]
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a database file
    pub fn open(path: impl AsRef<Path>) -> MemoryResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::init(conn)?;

        info!(path = %path.display(), "Opened memory store");
        Ok(store)
    }

    /// Private in-process database
    pub fn open_in_memory() -> MemoryResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> MemoryResult<Self> {
        conn.execute_batch(SCHEMA)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        let report = store.migrate_legacy_embeddings()?;
        if report.total() > 0 {
            info!(
                facts_converted = report.facts_converted,
                facts_cleared = report.facts_cleared,
                tool_converted = report.tool_converted,
                tool_cleared = report.tool_cleared,
                "Migrated legacy embeddings"
            );
        }
        Ok(store)
    }

    /// Rewrite every non-canonical embedding in the canonical encoding.
    ///
    /// Values no legacy decoder recognizes are set to NULL, so the row
    /// survives without an embedding. Running it twice is a no-op.
    pub fn migrate_legacy_embeddings(&self) -> MemoryResult<MigrationReport> {
        let conn = self.conn.lock();
        let (facts_converted, facts_cleared) = migrate_column(&conn, "facts", "embedding")?;
        let (tool_converted, tool_cleared) =
            migrate_column(&conn, "tool_cache", "input_embedding")?;

        Ok(MigrationReport {
            facts_converted,
            facts_cleared,
            tool_converted,
            tool_cleared,
        })
    }

    async fn blocking<T, F>(&self, f: F) -> MemoryResult<T>
    where
        F: FnOnce(&Connection) -> MemoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await?
    }
}

/// First bytes of a textual embedding: `[`, sign, dot, space or a digit
const TEXT_LEAD_BYTES: &str =
    "'5B','2D','2B','2E','20','30','31','32','33','34','35','36','37','38','39'";

fn migrate_column(conn: &Connection, table: &str, column: &str) -> MemoryResult<(usize, usize)> {
    let select = format!(
        "SELECT id, {column} FROM {table} \
         WHERE {column} IS NOT NULL \
           AND (typeof({column}) != 'blob' \
                OR length({column}) % 4 != 0 \
                OR hex(substr({column}, 1, 1)) IN ({TEXT_LEAD_BYTES}))"
    );

    // `None` leaves the row untouched, `Some(None)` clears it
    let mut rows: Vec<(String, Option<Vec<f32>>)> = Vec::new();
    {
        let mut stmt = conn.prepare(&select)?;
        let mapped = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            let action = match row.get_ref(1)? {
                // Aligned blobs are canonical unless they parse as text
                ValueRef::Blob(raw) if raw.len() % 4 == 0 => {
                    decode_text_embedding(raw).ok().map(Some)
                }
                ValueRef::Text(raw) | ValueRef::Blob(raw) => {
                    Some(decode_legacy_embedding(raw).ok())
                }
                _ => Some(None),
            };
            Ok((id, action))
        })?;
        for row in mapped {
            if let (id, Some(decoded)) = row? {
                rows.push((id, decoded));
            }
        }
    }

    if rows.is_empty() {
        return Ok((0, 0));
    }

    let update = format!("UPDATE {table} SET {column} = ?1 WHERE id = ?2");
    let mut converted = 0;
    let mut cleared = 0;

    let tx = conn.unchecked_transaction()?;
    for (id, decoded) in rows {
        match decoded {
            Some(vector) => {
                tx.execute(&update, params![encode_embedding(&vector), id])?;
                converted += 1;
            }
            None => {
                warn!(table, id = %id, "Clearing undecodable embedding");
                tx.execute(&update, params![Option::<Vec<u8>>::None, id])?;
                cleared += 1;
            }
        }
    }
    tx.commit()?;

    Ok((converted, cleared))
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

fn embedding_from_sql(value: ValueRef<'_>) -> Option<Vec<f32>> {
    match value {
        ValueRef::Blob(bytes) => decode_embedding(bytes).ok(),
        _ => None,
    }
}

fn embedding_to_sql(embedding: Option<&[f32]>) -> Option<Vec<u8>> {
    embedding.filter(|v| !v.is_empty()).map(encode_embedding)
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let metadata: String = row.get(4)?;
    let metadata = serde_json::from_str::<EntryMetadata>(&metadata)
        .unwrap_or_default()
        .normalized();

    Ok(Entry {
        id: EntryId(row.get(0)?),
        scope: row.get(1)?,
        content: row.get(2)?,
        embedding: embedding_from_sql(row.get_ref(3)?),
        metadata,
        created_at: from_millis(row.get(5)?),
        updated_at: from_millis(row.get(6)?),
    })
}

fn row_to_tool_entry(row: &Row<'_>) -> rusqlite::Result<ToolCacheEntry> {
    let metadata: String = row.get(7)?;

    Ok(ToolCacheEntry {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        tool_name: row.get(2)?,
        input_params: row.get(3)?,
        input_hash: row.get(4)?,
        input_embedding: embedding_from_sql(row.get_ref(5)?),
        output_result: row.get(6)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        created_at: from_millis(row.get(8)?),
        expires_at: from_millis(row.get(9)?),
    })
}

#[async_trait]
impl FactStore for SqliteStore {
    async fn insert_fact(&self, entry: &Entry) -> MemoryResult<()> {
        let entry = entry.clone();
        self.blocking(move |conn| {
            let metadata = serde_json::to_string(&entry.metadata.clone().normalized())?;
            conn.execute(
                "INSERT INTO facts (id, scope, content, embedding, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.id.as_str(),
                    entry.scope,
                    entry.content,
                    embedding_to_sql(entry.embedding.as_deref()),
                    metadata,
                    to_millis(entry.created_at),
                    to_millis(entry.updated_at),
                ],
            )?;
            debug!(id = %entry.id, scope = %entry.scope, "Inserted fact");
            Ok(())
        })
        .await
    }

    async fn scan_facts(&self, scope: &str) -> MemoryResult<Vec<Entry>> {
        let scope = scope.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {FACT_COLUMNS} FROM facts WHERE scope = ?1 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let entries = stmt
                .query_map(params![scope], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn scan_embedded_facts(&self, scope: &str) -> MemoryResult<Vec<Entry>> {
        let scope = scope.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {FACT_COLUMNS} FROM facts
                 WHERE scope = ?1 AND embedding IS NOT NULL
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let entries = stmt
                .query_map(params![scope], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn get_fact(&self, scope: &str, id: &EntryId) -> MemoryResult<Option<Entry>> {
        let scope = scope.to_string();
        let id = id.clone();
        self.blocking(move |conn| {
            let entry = conn
                .query_row(
                    &format!("SELECT {FACT_COLUMNS} FROM facts WHERE id = ?1 AND scope = ?2"),
                    params![id.as_str(), scope],
                    row_to_entry,
                )
                .optional()?;
            Ok(entry)
        })
        .await
    }

    async fn update_fact(&self, entry: &Entry) -> MemoryResult<bool> {
        let entry = entry.clone();
        self.blocking(move |conn| {
            let metadata = serde_json::to_string(&entry.metadata.clone().normalized())?;
            let changed = conn.execute(
                "UPDATE facts SET content = ?1, embedding = ?2, metadata = ?3, updated_at = ?4
                 WHERE id = ?5 AND scope = ?6",
                params![
                    entry.content,
                    embedding_to_sql(entry.embedding.as_deref()),
                    metadata,
                    to_millis(entry.updated_at),
                    entry.id.as_str(),
                    entry.scope,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn delete_fact(&self, scope: &str, id: &EntryId) -> MemoryResult<bool> {
        let scope = scope.to_string();
        let id = id.clone();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "DELETE FROM facts WHERE id = ?1 AND scope = ?2",
                params![id.as_str(), scope],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn delete_scope(&self, scope: &str) -> MemoryResult<usize> {
        let scope = scope.to_string();
        self.blocking(move |conn| {
            let changed = conn.execute("DELETE FROM facts WHERE scope = ?1", params![scope])?;
            Ok(changed)
        })
        .await
    }
}

#[async_trait]
impl ToolCacheStore for SqliteStore {
    async fn insert_tool_result(&self, entry: &ToolCacheEntry) -> MemoryResult<()> {
        let entry = entry.clone();
        self.blocking(move |conn| {
            let metadata = serde_json::to_string(&entry.metadata)?;
            conn.execute(
                &format!(
                    "INSERT INTO tool_cache ({TOOL_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    entry.id,
                    entry.conversation_id,
                    entry.tool_name,
                    entry.input_params,
                    entry.input_hash,
                    embedding_to_sql(entry.input_embedding.as_deref()),
                    entry.output_result,
                    metadata,
                    to_millis(entry.created_at),
                    to_millis(entry.expires_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_exact(
        &self,
        conversation_id: &str,
        tool_name: &str,
        input_params: &str,
        now: DateTime<Utc>,
    ) -> MemoryResult<Option<ToolCacheEntry>> {
        let conversation_id = conversation_id.to_string();
        let tool_name = tool_name.to_string();
        let input_params = input_params.to_string();
        self.blocking(move |conn| {
            let hash = input_hash(&input_params);
            let entry = conn
                .query_row(
                    &format!(
                        "SELECT {TOOL_COLUMNS} FROM tool_cache
                         WHERE conversation_id = ?1 AND tool_name = ?2 AND input_hash = ?3
                           AND input_params = ?4 AND expires_at > ?5
                         ORDER BY created_at DESC, rowid DESC
                         LIMIT 1"
                    ),
                    params![conversation_id, tool_name, hash, input_params, to_millis(now)],
                    row_to_tool_entry,
                )
                .optional()?;
            Ok(entry)
        })
        .await
    }

    async fn list_live(
        &self,
        conversation_id: &str,
        tool_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> MemoryResult<Vec<ToolCacheEntry>> {
        let conversation_id = conversation_id.to_string();
        let tool_name = tool_name.map(str::to_string);
        self.blocking(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {TOOL_COLUMNS} FROM tool_cache
                 WHERE conversation_id = ?1 AND expires_at > ?2
                   AND (?3 IS NULL OR tool_name = ?3)
                 ORDER BY created_at DESC, rowid DESC"
            ))?;
            let entries = stmt
                .query_map(
                    params![conversation_id, to_millis(now), tool_name],
                    row_to_tool_entry,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> MemoryResult<usize> {
        self.blocking(move |conn| {
            let changed = conn.execute(
                "DELETE FROM tool_cache WHERE expires_at <= ?1",
                params![to_millis(now)],
            )?;
            Ok(changed)
        })
        .await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> MemoryResult<usize> {
        let conversation_id = conversation_id.to_string();
        self.blocking(move |conn| {
            let changed = conn.execute(
                "DELETE FROM tool_cache WHERE conversation_id = ?1",
                params![conversation_id],
            )?;
            Ok(changed)
        })
        .await
    }

    async fn count_tool_results(&self, conversation_id: &str) -> MemoryResult<usize> {
        let conversation_id = conversation_id.to_string();
        self.blocking(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tool_cache WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recollect_core::Priority;
    use serde_json::json;

    fn fact(scope: &str, content: &str) -> Entry {
        Entry::new(scope, content).embedding(Some(vec![0.5, -0.25, 1.0]))
    }

    #[tokio::test]
    async fn test_fact_crud() {
        let store = SqliteStore::open_in_memory().unwrap();
        let entry = fact("u1", "User prefers dark roast coffee")
            .metadata(EntryMetadata::category(" Preferences ").with_priority(Priority::High));

        store.insert_fact(&entry).await.unwrap();

        let loaded = store.get_fact("u1", &entry.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, entry.content);
        assert_eq!(loaded.embedding, entry.embedding);
        assert_eq!(loaded.metadata.category, "preferences");
        assert_eq!(loaded.metadata.priority, Priority::High);
        assert_eq!(loaded.created_at.timestamp_millis(), entry.created_at.timestamp_millis());

        let mut updated = loaded.clone();
        updated.content = "User prefers medium roast coffee".to_string();
        updated.embedding = None;
        updated.updated_at = Utc::now();
        assert!(store.update_fact(&updated).await.unwrap());

        let reloaded = store.get_fact("u1", &entry.id).await.unwrap().unwrap();
        assert_eq!(reloaded.content, "User prefers medium roast coffee");
        assert!(reloaded.embedding.is_none());

        assert!(store.delete_fact("u1", &entry.id).await.unwrap());
        assert!(!store.delete_fact("u1", &entry.id).await.unwrap());
        assert!(store.get_fact("u1", &entry.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mine = fact("u1", "User lives in Pune");
        store.insert_fact(&mine).await.unwrap();
        store.insert_fact(&fact("u2", "User lives in Oslo")).await.unwrap();

        let scanned = store.scan_facts("u1").await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].id, mine.id);

        store.insert_fact(&Entry::new("u1", "User has no embedding yet")).await.unwrap();
        assert_eq!(store.scan_facts("u1").await.unwrap().len(), 2);
        let embedded = store.scan_embedded_facts("u1").await.unwrap();
        assert_eq!(embedded.len(), 1);
        assert_eq!(embedded[0].id, mine.id);

        assert!(store.get_fact("u2", &mine.id).await.unwrap().is_none());
        assert!(!store.delete_fact("u2", &mine.id).await.unwrap());

        let mut foreign = mine.clone();
        foreign.scope = "u2".to_string();
        assert!(!store.update_fact(&foreign).await.unwrap());

        assert_eq!(store.delete_scope("u2").await.unwrap(), 1);
        assert_eq!(store.scan_facts("u1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scan_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut older = fact("u1", "first fact stored here");
        older.created_at = older.created_at - chrono::Duration::seconds(10);
        let newer = fact("u1", "second fact stored here");
        store.insert_fact(&older).await.unwrap();
        store.insert_fact(&newer).await.unwrap();

        let ids: Vec<_> = store
            .scan_facts("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_tool_cache_exact_and_expiry() {
        let store = SqliteStore::open_in_memory().unwrap();
        let live = ToolCacheEntry::new(
            "c1",
            "get_product",
            &json!({"sku": "X"}),
            &json!({"title": "Y"}),
            chrono::Duration::hours(24),
        );
        let dead = ToolCacheEntry::new(
            "c1",
            "get_product",
            &json!({"sku": "Z"}),
            &json!({"title": "W"}),
            chrono::Duration::zero(),
        );
        store.insert_tool_result(&live).await.unwrap();
        store.insert_tool_result(&dead).await.unwrap();

        let now = Utc::now();
        let hit = store
            .find_exact("c1", "get_product", r#"{"sku":"X"}"#, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, live.id);
        assert!(store
            .find_exact("c1", "get_product", r#"{"sku":"Z"}"#, now)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_exact("c2", "get_product", r#"{"sku":"X"}"#, now)
            .await
            .unwrap()
            .is_none());

        assert_eq!(store.list_live("c1", None, now).await.unwrap().len(), 1);
        assert_eq!(
            store.list_live("c1", Some("other_tool"), now).await.unwrap().len(),
            0
        );
        assert_eq!(store.count_tool_results("c1").await.unwrap(), 2);

        assert_eq!(store.delete_expired(now).await.unwrap(), 1);
        assert_eq!(store.count_tool_results("c1").await.unwrap(), 1);
        assert_eq!(store.delete_conversation("c1").await.unwrap(), 1);
        assert_eq!(store.count_tool_results("c1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_migrates_legacy_embeddings() {
        let store = SqliteStore::open_in_memory().unwrap();
        {
            let conn = store.conn.lock();
            let insert = "INSERT INTO facts (id, scope, content, embedding, metadata, created_at, updated_at)
                          VALUES (?1, 'u1', ?2, ?3, '{}', 0, 0)";
            conn.execute(insert, params!["json", "json array", "[0.5, 0.25]"]).unwrap();
            conn.execute(insert, params!["csv", "delimited", "1.0; 2.0; 3.0"]).unwrap();
            conn.execute(insert, params!["junk", "garbage", "not numbers"]).unwrap();
            conn.execute(insert, params!["odd", "odd blob", vec![1u8, 2, 3]]).unwrap();
            conn.execute(
                insert,
                params!["canonical", "already fine", encode_embedding(&[1.0, 0.0])],
            )
            .unwrap();
            // Text payloads written as blobs with an aligned length
            let json_blob = b"[1, 2, 3, 4]".to_vec();
            conn.execute(insert, params!["json_blob", "json blob", json_blob]).unwrap();
            let csv_blob = b"0.5 0.25".to_vec();
            conn.execute(insert, params!["csv_blob", "csv blob", csv_blob]).unwrap();
            // Canonical blob whose first byte is an ASCII digit
            let digit_lead = vec![0x31u8, 0x00, 0x80, 0x3F];
            conn.execute(insert, params!["digit_lead", "digit lead", digit_lead]).unwrap();
        }

        let report = store.migrate_legacy_embeddings().unwrap();
        assert_eq!(report.facts_converted, 4);
        assert_eq!(report.facts_cleared, 2);
        assert_eq!(report.total(), 6);

        let get = |id: &str| {
            let store = store.clone();
            let id = EntryId::from_string(id);
            async move { store.get_fact("u1", &id).await.unwrap().unwrap() }
        };
        assert_eq!(get("json").await.embedding, Some(vec![0.5, 0.25]));
        assert_eq!(get("csv").await.embedding, Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(get("junk").await.embedding, None);
        assert_eq!(get("odd").await.embedding, None);
        assert_eq!(get("canonical").await.embedding, Some(vec![1.0, 0.0]));
        assert_eq!(get("json_blob").await.embedding, Some(vec![1.0, 2.0, 3.0, 4.0]));
        assert_eq!(get("csv_blob").await.embedding, Some(vec![0.5, 0.25]));
        assert_eq!(
            get("digit_lead").await.embedding,
            Some(decode_embedding(&[0x31, 0x00, 0x80, 0x3F]).unwrap())
        );

        assert_eq!(store.migrate_legacy_embeddings().unwrap(), MigrationReport::default());
    }

    #[tokio::test]
    async fn test_undecodable_metadata_gets_defaults() {
        let store = SqliteStore::open_in_memory().unwrap();
        {
            let conn = store.conn.lock();
            conn.execute(
                "INSERT INTO facts (id, scope, content, embedding, metadata, created_at, updated_at)
                 VALUES ('m1', 'u1', 'content with odd metadata', NULL, 'not json', 0, 0)",
                [],
            )
            .unwrap();
        }

        let entry = store
            .get_fact("u1", &EntryId::from_string("m1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.metadata, EntryMetadata::default());
        assert!(entry.embedding.is_none());
    }

    #[tokio::test]
    async fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.db");
        let entry = fact("u1", "User prefers window seats");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_fact(&entry).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let scanned = store.scan_facts("u1").await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].id, entry.id);
        assert_eq!(scanned[0].embedding, entry.embedding);
    }
}
