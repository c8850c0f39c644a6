//! Recall engine: the embedding-backed vector index.
//!
//! Embeds text through the external service (or the deterministic fallback
//! when it fails), persists vectors in the SQLite store, answers cosine
//! similarity queries, and migrates legacy JSON sidecar files exactly once.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::recall::embedding::{cosine_similarity, fallback_embedding, EmbeddingService};
use crate::recall::store::{EntryMetadata, SourceType, VectorRecord, VectorStore};

/// Query parameters for [`RecallEngine::recall`].
#[derive(Debug, Clone, Copy)]
pub struct RecallOptions {
    /// Minimum cosine similarity; results below it are dropped.
    pub threshold: f64,
    /// Maximum number of hits returned.
    pub limit: usize,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            limit: 5,
        }
    }
}

/// One recall hit with its similarity to the query.
#[derive(Debug, Clone)]
pub struct RecallHit {
    pub record: VectorRecord,
    pub similarity: f64,
}

/// Outcome of a sidecar migration run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: usize,
    pub skipped: usize,
}

/// Sidecar entries as written by the legacy JSON index.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEntry {
    id: String,
    vector: Vec<f32>,
    #[serde(default)]
    source_type: Option<String>,
    source_id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: EntryMetadata,
    #[serde(default)]
    created_at: i64,
}

/// The vector index and its embedding pipeline.
pub struct RecallEngine {
    store: VectorStore,
    embedder: Option<Arc<dyn EmbeddingService>>,
    clock: Arc<dyn Clock>,
    fallback_embeddings: AtomicU64,
}

impl RecallEngine {
    pub fn new(
        store: VectorStore,
        embedder: Option<Arc<dyn EmbeddingService>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            embedder,
            clock,
            fallback_embeddings: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// How many times the deterministic fallback stood in for the embedding
    /// service.
    pub fn fallback_embeddings(&self) -> u64 {
        self.fallback_embeddings.load(Ordering::Relaxed)
    }

    /// Embed and index one document. A duplicate `source_id` replaces the
    /// prior entry.
    pub async fn index(
        &mut self,
        source_type: SourceType,
        source_id: &str,
        text: &str,
        metadata: EntryMetadata,
    ) -> Result<VectorRecord, CoreError> {
        let vector = self.embed(text).await;
        let record = VectorRecord {
            id: Uuid::new_v4().to_string(),
            dimensions: vector.len(),
            vector,
            text: text.to_string(),
            source_type,
            source_id: source_id.to_string(),
            metadata,
            created_at: self.clock.now_millis(),
        };
        self.store.upsert(&record)?;
        tracing::debug!(
            source_id,
            dimensions = record.dimensions,
            "document indexed"
        );
        Ok(record)
    }

    pub fn remove_source(&mut self, source_id: &str) -> Result<usize, CoreError> {
        self.store.delete_by_source_id(source_id)
    }

    /// Similarity search over every stored entry.
    ///
    /// This is a suspension point (the embedding call is I/O). A cancelled
    /// recall returns [`CoreError::Cancelled`] and never touches the index.
    pub async fn recall(
        &self,
        query: &str,
        options: RecallOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<RecallHit>, CoreError> {
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(CoreError::Cancelled);
        }
        let query_vec = self.embed(query).await;
        if cancel.is_some_and(|c| c.is_cancelled()) {
            return Err(CoreError::Cancelled);
        }

        let mut hits: Vec<RecallHit> = self
            .store
            .get_all()?
            .into_iter()
            .map(|record| {
                let similarity = cosine_similarity(&query_vec, &record.vector);
                RecallHit { record, similarity }
            })
            .filter(|hit| hit.similarity >= options.threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(options.limit);
        Ok(hits)
    }

    /// Migrate a legacy JSON sidecar into the store.
    ///
    /// Entries whose `source_id` already exists are skipped, never
    /// overwritten. On success the sidecar is renamed with a `.bak` suffix
    /// so a restart cannot re-migrate it. Malformed JSON is logged and
    /// treated as zero migrated.
    pub fn migrate_sidecar(&mut self, path: &Path) -> Result<MigrationReport, CoreError> {
        if !path.exists() {
            return Ok(MigrationReport::default());
        }
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "sidecar unreadable");
                return Ok(MigrationReport::default());
            }
        };
        let entries: Vec<LegacyEntry> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "sidecar is malformed JSON");
                return Ok(MigrationReport::default());
            }
        };

        let mut report = MigrationReport::default();
        for entry in entries {
            if self.store.contains_source(&entry.source_id)? {
                report.skipped += 1;
                continue;
            }
            let record = VectorRecord {
                id: entry.id,
                dimensions: entry.vector.len(),
                vector: entry.vector,
                text: entry.text,
                source_type: SourceType::parse(entry.source_type.as_deref().unwrap_or("session")),
                source_id: entry.source_id,
                metadata: entry.metadata,
                created_at: entry.created_at,
            };
            self.store.upsert(&record)?;
            report.migrated += 1;
        }

        // The rename is the durability marker for the migration.
        let backup = path.with_extension("json.bak");
        if let Err(e) = std::fs::rename(path, &backup) {
            tracing::warn!(path = %path.display(), error = %e, "sidecar rename failed");
        } else {
            tracing::info!(
                migrated = report.migrated,
                skipped = report.skipped,
                backup = %backup.display(),
                "sidecar migration complete"
            );
        }
        Ok(report)
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        if let Some(service) = &self.embedder {
            match service.embed(text).await {
                Ok(vector) if !vector.is_empty() => return vector,
                Ok(_) => {
                    tracing::warn!("embedding service returned an empty vector; using fallback");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "embedding service failed; using fallback");
                }
            }
        }
        self.fallback_embeddings.fetch_add(1, Ordering::Relaxed);
        fallback_embedding(text)
    }
}
