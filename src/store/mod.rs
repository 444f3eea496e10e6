//! Persisted chunk records and the sqlite-backed chunk store.

use std::path::Path;

use tokio_rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::types::{Chunk, ContentRole};

/// Source type tag for legal-document chunks in the shared chunk table.
pub const SOURCE_TYPE_LEGAL_DOCUMENT: &str = "LEGAL_DOCUMENT";

/// A chunk row as persisted.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub source_type: String,
    pub source_id: String,
    pub path: String,
    pub contextual_header: String,
    pub content: String,
    pub content_role: ContentRole,
    pub token_count: usize,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    pub context_prefix: Option<String>,
    /// Vector rendered as `[v0,v1,...]`.
    pub embedding: Option<String>,
}

impl ChunkRecord {
    /// Build a record from a derived chunk plus its enrichment outputs.
    pub fn from_chunk(
        chunk: &Chunk,
        context_prefix: Option<String>,
        embedding: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_type: SOURCE_TYPE_LEGAL_DOCUMENT.to_string(),
            source_id: chunk.source_id.clone(),
            path: chunk.path.clone(),
            contextual_header: chunk.contextual_header.clone(),
            content: chunk.content.clone(),
            content_role: chunk.content_role,
            token_count: chunk.token_count,
            metadata: if chunk.metadata.is_empty() {
                None
            } else {
                Some(chunk.metadata.clone())
            },
            context_prefix,
            embedding,
        }
    }
}

/// Sqlite-backed chunk store. The unique `(source_type, source_id, path)`
/// index is what makes resync idempotent.
pub struct ChunkStore {
    conn: Connection,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS content_chunks (
    id TEXT PRIMARY KEY,
    source_type TEXT NOT NULL,
    source_id TEXT NOT NULL,
    path TEXT NOT NULL,
    contextual_header TEXT NOT NULL,
    content TEXT NOT NULL,
    content_role TEXT NOT NULL,
    token_count INTEGER NOT NULL,
    metadata TEXT,
    context_prefix TEXT,
    embedding TEXT,
    created_at TEXT NOT NULL,
    UNIQUE(source_type, source_id, path)
);
CREATE INDEX IF NOT EXISTS idx_content_chunks_source
    ON content_chunks (source_id);
";

const SELECT_COLUMNS: &str = "id, source_type, source_id, path, contextual_header, \
     content, content_role, token_count, metadata, context_prefix, embedding";

impl ChunkStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let conn = Connection::open(path).await?;
        Self::migrate(conn).await
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> Result<Self, PipelineError> {
        let conn = Connection::open_in_memory().await?;
        Self::migrate(conn).await
    }

    async fn migrate(conn: Connection) -> Result<Self, PipelineError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)
                .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await?;
        Ok(Self { conn })
    }

    /// Atomically replace all chunks of a source: delete the old set and
    /// insert the new one in a single transaction. Any failure rolls the
    /// whole replacement back, leaving the previous index intact.
    pub async fn replace_for_source(
        &self,
        source_id: &str,
        records: Vec<ChunkRecord>,
    ) -> Result<(usize, usize), PipelineError> {
        let source_id = source_id.to_string();
        let (deleted, inserted) = self
            .conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let deleted = tx
                    .execute(
                        "DELETE FROM content_chunks WHERE source_type = ? AND source_id = ?",
                        (SOURCE_TYPE_LEGAL_DOCUMENT, &source_id),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut inserted = 0;
                {
                    let mut stmt = tx
                        .prepare(
                            "INSERT INTO content_chunks \
                             (id, source_type, source_id, path, contextual_header, content, \
                              content_role, token_count, metadata, context_prefix, embedding, \
                              created_at) \
                             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                        )
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    for record in &records {
                        let metadata = record
                            .metadata
                            .as_ref()
                            .map(|m| serde_json::Value::Object(m.clone()).to_string());
                        stmt.execute((
                            &record.id,
                            &record.source_type,
                            &record.source_id,
                            &record.path,
                            &record.contextual_header,
                            &record.content,
                            record.content_role.as_str(),
                            record.token_count as i64,
                            metadata,
                            &record.context_prefix,
                            &record.embedding,
                            chrono::Utc::now().to_rfc3339(),
                        ))
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                        inserted += 1;
                    }
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok((deleted, inserted))
            })
            .await?;
        debug!(deleted, inserted, "replaced chunk set");
        Ok((deleted, inserted))
    }

    /// All chunks of a source, in insertion order.
    pub async fn chunks_for_source(
        &self,
        source_id: &str,
    ) -> Result<Vec<ChunkRecord>, PipelineError> {
        let source_id = source_id.to_string();
        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {SELECT_COLUMNS} FROM content_chunks \
                         WHERE source_id = ? ORDER BY rowid"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map([&source_id], |row| {
                        let role: String = row.get(6)?;
                        let metadata: Option<String> = row.get(8)?;
                        Ok(ChunkRecord {
                            id: row.get(0)?,
                            source_type: row.get(1)?,
                            source_id: row.get(2)?,
                            path: row.get(3)?,
                            contextual_header: row.get(4)?,
                            content: row.get(5)?,
                            content_role: ContentRole::parse(&role)
                                .unwrap_or(ContentRole::Stycke),
                            token_count: row.get::<_, i64>(7)? as usize,
                            metadata: metadata
                                .and_then(|m| {
                                    serde_json::from_str::<serde_json::Value>(&m).ok()
                                })
                                .and_then(|v| v.as_object().cloned()),
                            context_prefix: row.get(9)?,
                            embedding: row.get(10)?,
                        })
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut records = Vec::new();
                for row in rows {
                    records.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(records)
            })
            .await?;
        Ok(records)
    }

    pub async fn count(&self) -> Result<usize, PipelineError> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM content_chunks", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await?;
        Ok(count)
    }

    /// Chunks still waiting for a context prefix.
    pub async fn count_missing_prefix(&self) -> Result<usize, PipelineError> {
        self.count_where("context_prefix IS NULL").await
    }

    /// Chunks still waiting for an embedding.
    pub async fn count_missing_embedding(&self) -> Result<usize, PipelineError> {
        self.count_where("embedding IS NULL").await
    }

    async fn count_where(&self, predicate: &'static str) -> Result<usize, PipelineError> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn
                    .query_row(
                        &format!("SELECT COUNT(*) FROM content_chunks WHERE {predicate}"),
                        [],
                        |row| row.get(0),
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;

    fn chunk(source_id: &str, path: &str) -> Chunk {
        Chunk {
            source_id: source_id.into(),
            path: path.into(),
            contextual_header: "Testlag (2020:1) > 1 §".into(),
            content: "Paragraftext.".into(),
            content_role: ContentRole::Stycke,
            token_count: 4,
            metadata: serde_json::Map::new(),
        }
    }

    fn record(source_id: &str, path: &str) -> ChunkRecord {
        ChunkRecord::from_chunk(
            &chunk(source_id, path),
            Some("Kontext.".into()),
            Some("[0.1,0.2]".into()),
        )
    }

    #[tokio::test]
    async fn replace_inserts_and_reports_counts() {
        let store = ChunkStore::open_in_memory().await.unwrap();
        let (deleted, inserted) = store
            .replace_for_source("doc-1", vec![record("doc-1", "kap1.§1"), record("doc-1", "kap1.§2")])
            .await
            .unwrap();
        assert_eq!((deleted, inserted), (0, 2));

        let (deleted, inserted) = store
            .replace_for_source("doc-1", vec![record("doc-1", "kap1.§1")])
            .await
            .unwrap();
        assert_eq!((deleted, inserted), (2, 1));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn replace_rolls_back_on_failure() {
        let store = ChunkStore::open_in_memory().await.unwrap();
        store
            .replace_for_source("doc-1", vec![record("doc-1", "kap1.§1")])
            .await
            .unwrap();

        // Duplicate path violates the unique index mid-transaction.
        let bad_set = vec![
            record("doc-1", "kap2.§1"),
            record("doc-1", "kap2.§2"),
            record("doc-1", "kap2.§1"),
        ];
        let result = store.replace_for_source("doc-1", bad_set).await;
        assert!(result.is_err());

        // Previous set survives untouched.
        let records = store.chunks_for_source("doc-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, "kap1.§1");
    }

    #[tokio::test]
    async fn records_round_trip() {
        let store = ChunkStore::open_in_memory().await.unwrap();
        let mut source = chunk("doc-1", "kap1.§1");
        source
            .metadata
            .insert("documentNumber".into(), "2020:1".into());
        let record = ChunkRecord::from_chunk(&source, None, Some("[1,2,3]".into()));
        store
            .replace_for_source("doc-1", vec![record])
            .await
            .unwrap();

        let records = store.chunks_for_source("doc-1").await.unwrap();
        assert_eq!(records.len(), 1);
        let stored = &records[0];
        assert_eq!(stored.source_type, SOURCE_TYPE_LEGAL_DOCUMENT);
        assert_eq!(stored.content_role, ContentRole::Stycke);
        assert_eq!(stored.context_prefix, None);
        assert_eq!(stored.embedding.as_deref(), Some("[1,2,3]"));
        assert_eq!(
            stored
                .metadata
                .as_ref()
                .and_then(|m| m.get("documentNumber"))
                .and_then(|v| v.as_str()),
            Some("2020:1")
        );
        assert_eq!(store.count_missing_prefix().await.unwrap(), 1);
        assert_eq!(store.count_missing_embedding().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sources_are_isolated() {
        let store = ChunkStore::open_in_memory().await.unwrap();
        store
            .replace_for_source("doc-1", vec![record("doc-1", "kap1.§1")])
            .await
            .unwrap();
        store
            .replace_for_source("doc-2", vec![record("doc-2", "kap1.§1")])
            .await
            .unwrap();

        let (deleted, _) = store.replace_for_source("doc-1", vec![]).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.chunks_for_source("doc-2").await.unwrap().len(), 1);
    }
}
