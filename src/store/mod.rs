//! Chunk storage and index snapshots
//!
//! An `IndexSnapshot` bundles one immutable `ChunkStore` with the lexical and vector
//! indexes built from it. Queries hold an `Arc` to the snapshot they started with; a
//! rebuild constructs a complete new snapshot and swaps the active pointer, so a
//! request never observes a half-built index.

pub mod catalog;
mod chunk;
pub mod ingest;

pub use catalog::{CatalogStats, ChunkCatalog, ImportOutcome};
pub use chunk::{normalize, Chunk, ChunkId, ChunkStore};
pub use ingest::{read_jsonl, ChunkRecord};

use crate::config::{LexicalConfig, VectorConfig};
use crate::index::{build_lexical_index, build_vector_index, IndexError, LexicalIndex, VectorIndex};
use crate::text::Tokenizer;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Duplicate chunk id {0}")]
    DuplicateChunk(ChunkId),

    #[error("Chunk {chunk_id} has embedding dimension {actual}, expected {expected}")]
    DimensionMismatch {
        chunk_id: ChunkId,
        expected: usize,
        actual: usize,
    },

    #[error("Chunk {0} has a zero or non-finite embedding")]
    InvalidEmbedding(ChunkId),

    #[error("Chunk {0} has no embedding")]
    MissingEmbedding(ChunkId),

    #[error("Index build failed: {0}")]
    Index(#[from] IndexError),
}

/// One consistent, read-only view of the corpus and its indexes
pub struct IndexSnapshot {
    store: ChunkStore,
    lexical: Box<dyn LexicalIndex>,
    vector: Box<dyn VectorIndex>,
    tokenizer: Tokenizer,
    built_at: DateTime<Utc>,
}

impl IndexSnapshot {
    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn lexical(&self) -> &dyn LexicalIndex {
        self.lexical.as_ref()
    }

    pub fn vector(&self) -> &dyn VectorIndex {
        self.vector.as_ref()
    }

    /// Analyzer the lexical index was built with; queries must use the same one
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn version(&self) -> u64 {
        self.store.version()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }
}

impl std::fmt::Debug for IndexSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSnapshot")
            .field("version", &self.version())
            .field("chunks", &self.store.len())
            .field("lexical", &self.lexical.backend())
            .field("vector", &self.vector.backend())
            .field("built_at", &self.built_at)
            .finish()
    }
}

/// Builds snapshots with a fixed index configuration
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    lexical: LexicalConfig,
    vector: VectorConfig,
}

impl SnapshotBuilder {
    pub fn new(lexical: LexicalConfig, vector: VectorConfig) -> Self {
        Self { lexical, vector }
    }

    /// Tokenizer matching the configured analyzer, for computing term frequencies
    pub fn tokenizer(&self) -> Tokenizer {
        Tokenizer::new(&self.lexical.stop_words)
    }

    /// Build a complete snapshot from chunk records
    pub fn build(&self, version: u64, chunks: Vec<Chunk>) -> Result<IndexSnapshot, SnapshotError> {
        let store = ChunkStore::new(version, chunks)?;
        self.build_from_store(store)
    }

    /// Snapshot with no chunks; every query against it yields an empty context
    pub fn empty(&self) -> Result<IndexSnapshot, SnapshotError> {
        self.build_from_store(ChunkStore::empty(0))
    }

    fn build_from_store(&self, store: ChunkStore) -> Result<IndexSnapshot, SnapshotError> {
        let tokenizer = self.tokenizer();
        let lexical = build_lexical_index(&self.lexical, &store, &tokenizer)?;
        let vector = build_vector_index(&self.vector, &store)?;

        tracing::info!(
            "Built snapshot v{}: {} chunks, dim {}, lexical={}, vector={}",
            store.version(),
            store.len(),
            store.dimension(),
            lexical.backend(),
            vector.backend()
        );

        Ok(IndexSnapshot {
            store,
            lexical,
            vector,
            tokenizer,
            built_at: Utc::now(),
        })
    }
}

/// Shared pointer to the active snapshot.
///
/// Readers clone the `Arc` under a read lock held only for the clone; `swap` replaces
/// the pointer under the write lock. In-flight requests keep the snapshot they cloned.
#[derive(Debug)]
pub struct SnapshotHandle {
    current: RwLock<Arc<IndexSnapshot>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: IndexSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The active snapshot
    pub fn current(&self) -> Arc<IndexSnapshot> {
        self.current.read().clone()
    }

    /// Install a new snapshot, returning the one it replaced
    pub fn swap(&self, next: IndexSnapshot) -> Arc<IndexSnapshot> {
        let next = Arc::new(next);
        let next_version = next.version();
        let previous = std::mem::replace(&mut *self.current.write(), next);
        tracing::info!(
            "Swapped active snapshot v{} -> v{}",
            previous.version(),
            next_version
        );
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: ChunkId, text: &str, embedding: Vec<f32>) -> Chunk {
        let tokenizer = Tokenizer::default();
        Chunk {
            id,
            source_ref: format!("Artículo {}", id),
            title: None,
            article: Some(id as u32),
            text: text.to_string(),
            token_count: text.split_whitespace().count(),
            embedding,
            term_frequencies: tokenizer.term_frequencies(text),
        }
    }

    fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new(LexicalConfig::default(), VectorConfig::default())
    }

    #[test]
    fn test_build_snapshot() {
        let snapshot = builder()
            .build(
                4,
                vec![
                    chunk(1, "multa por exceso de velocidad", vec![1.0, 0.0]),
                    chunk(2, "registro del vehículo", vec![0.0, 1.0]),
                ],
            )
            .unwrap();

        assert_eq!(snapshot.version(), 4);
        assert_eq!(snapshot.store().len(), 2);
        assert_eq!(snapshot.vector().dimension(), 2);

        let tokens = snapshot.tokenizer().tokenize("velocidad");
        let scores = snapshot.lexical().score(&tokens).unwrap();
        assert!(scores.contains_key(&1));
        assert!(!scores.contains_key(&2));
    }

    #[test]
    fn test_swap_keeps_old_snapshot_alive() {
        let handle = SnapshotHandle::new(
            builder()
                .build(1, vec![chunk(1, "velocidad máxima", vec![1.0, 0.0])])
                .unwrap(),
        );

        let in_flight = handle.current();
        let previous = handle.swap(
            builder()
                .build(
                    2,
                    vec![
                        chunk(1, "velocidad máxima", vec![1.0, 0.0]),
                        chunk(2, "licencia de conducción", vec![0.0, 1.0]),
                    ],
                )
                .unwrap(),
        );

        assert_eq!(previous.version(), 1);
        assert_eq!(in_flight.version(), 1);
        assert_eq!(in_flight.store().len(), 1);
        assert_eq!(handle.current().version(), 2);
        assert_eq!(handle.current().store().len(), 2);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = builder().empty().unwrap();
        assert!(snapshot.store().is_empty());
        assert!(snapshot.lexical().score(&["multa".to_string()]).unwrap().is_empty());
        assert!(snapshot.vector().search(&[], 5).unwrap().is_empty());
    }
}
