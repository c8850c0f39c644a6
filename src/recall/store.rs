//! Local vector index backed by SQLite.
//!
//! One table holds every embedding row; vectors are stored as little-endian
//! f32 BLOBs and `source_id` is indexed because re-indexing a source is a
//! delete-then-insert on that key.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::clock::Millis;
use crate::error::CoreError;

/// Where an embedding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Session,
    Stream,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Session => "session",
            SourceType::Stream => "stream",
        }
    }

    pub fn parse(s: &str) -> SourceType {
        match s {
            "stream" => SourceType::Stream,
            _ => SourceType::Session,
        }
    }
}

/// Optional descriptive metadata carried with each entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// One stored embedding row.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub dimensions: usize,
    pub metadata: EntryMetadata,
    pub created_at: Millis,
}

/// Encode a vector as a little-endian f32 byte sequence.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Decode a little-endian f32 byte sequence. Trailing partial floats are
/// ignored.
pub fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// SQLite-backed embedding store. Single writer; a duplicate `source_id` is
/// a last-writer-wins replace.
pub struct VectorStore {
    conn: Connection,
}

impl VectorStore {
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, CoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS embeddings (
                id TEXT PRIMARY KEY,
                vector BLOB NOT NULL,
                text TEXT NOT NULL,
                source_type TEXT NOT NULL,
                source_id TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                metadata TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_embeddings_source_id
                ON embeddings (source_id);",
        )?;
        Ok(Self { conn })
    }

    /// Insert a record, atomically replacing any prior entry with the same
    /// `source_id`.
    pub fn upsert(&mut self, record: &VectorRecord) -> Result<(), CoreError> {
        let metadata = serde_json::to_string(&record.metadata)
            .map_err(|e| CoreError::InvalidInput(format!("metadata not serialisable: {e}")))?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM embeddings WHERE source_id = ?1",
            params![record.source_id],
        )?;
        tx.execute(
            "INSERT INTO embeddings
                (id, vector, text, source_type, source_id, dimensions, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                encode_vector(&record.vector),
                record.text,
                record.source_type.as_str(),
                record.source_id,
                record.dimensions as i64,
                metadata,
                record.created_at,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_all(&self) -> Result<Vec<VectorRecord>, CoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, vector, text, source_type, source_id, dimensions, metadata, created_at
             FROM embeddings",
        )?;
        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(1)?;
            let source_type: String = row.get(3)?;
            let metadata_json: String = row.get(6)?;
            Ok(VectorRecord {
                id: row.get(0)?,
                vector: decode_vector(&blob),
                text: row.get(2)?,
                source_type: SourceType::parse(&source_type),
                source_id: row.get(4)?,
                dimensions: row.get::<_, i64>(5)? as usize,
                metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
                created_at: row.get(7)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn contains_source(&self, source_id: &str) -> Result<bool, CoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM embeddings WHERE source_id = ?1 LIMIT 1",
                params![source_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Remove every entry for a source. Returns the number of rows deleted.
    pub fn delete_by_source_id(&mut self, source_id: &str) -> Result<usize, CoreError> {
        Ok(self
            .conn
            .execute("DELETE FROM embeddings WHERE source_id = ?1", params![source_id])?)
    }

    pub fn len(&self) -> Result<usize, CoreError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, CoreError> {
        Ok(self.len()? == 0)
    }
}
