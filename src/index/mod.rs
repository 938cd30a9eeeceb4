//! Lexical and vector indexes over a `ChunkStore`
//!
//! Both kinds sit behind a trait so the retriever does not care which backend a
//! snapshot was built with:
//! - `Bm25Index` / `TantivyKeywordIndex` for lexical scoring
//! - `ExactVectorIndex` / `HnswVectorIndex` for cosine similarity

mod bm25;
mod hnsw;
mod keyword;
mod vector;

pub use bm25::Bm25Index;
pub use hnsw::HnswVectorIndex;
pub use keyword::TantivyKeywordIndex;
pub use vector::ExactVectorIndex;

use crate::config::{LexicalBackend, LexicalConfig, VectorBackend, VectorConfig};
use crate::store::{ChunkId, ChunkStore};
use crate::text::Tokenizer;
use std::cmp::Ordering;
use std::collections::HashMap;
use tantivy::TantivyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Index build failed: {0}")]
    BuildError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),
}

/// Keyword relevance over analyzed query tokens
pub trait LexicalIndex: Send + Sync {
    /// Score every chunk containing at least one query token. Chunks with no match are
    /// absent from the map; scores are non-negative.
    fn score(&self, tokens: &[String]) -> Result<HashMap<ChunkId, f32>, IndexError>;

    fn backend(&self) -> &'static str;
}

/// Nearest-neighbour search over unit-length embeddings
pub trait VectorIndex: Send + Sync {
    /// Top `k` chunks by cosine similarity, best first, ties broken by ascending id.
    /// `query` must be unit length and match `dimension()`.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ChunkId, f32)>, IndexError>;

    fn dimension(&self) -> usize;

    fn backend(&self) -> &'static str;
}

pub fn build_lexical_index(
    config: &LexicalConfig,
    store: &ChunkStore,
    tokenizer: &Tokenizer,
) -> Result<Box<dyn LexicalIndex>, IndexError> {
    Ok(match config.backend {
        LexicalBackend::Bm25 => Box::new(Bm25Index::build(store, config.k1, config.b)),
        LexicalBackend::Tantivy => Box::new(TantivyKeywordIndex::build(store, tokenizer)?),
    })
}

pub fn build_vector_index(
    config: &VectorConfig,
    store: &ChunkStore,
) -> Result<Box<dyn VectorIndex>, IndexError> {
    Ok(match config.backend {
        VectorBackend::Exact => Box::new(ExactVectorIndex::build(store)),
        VectorBackend::Hnsw => Box::new(HnswVectorIndex::build(
            store,
            config.hnsw_m,
            config.hnsw_ef_construction,
            config.hnsw_ef_search,
        )),
    })
}

/// Order hits by score descending, then id ascending
pub(crate) fn sort_hits(hits: &mut [(ChunkId, f32)]) {
    hits.sort_by(|a, b| match b.1.total_cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_hits_breaks_ties_by_id() {
        let mut hits = vec![(5, 0.5), (2, 0.9), (3, 0.5), (1, 0.1)];
        sort_hits(&mut hits);
        assert_eq!(hits, vec![(2, 0.9), (3, 0.5), (5, 0.5), (1, 0.1)]);
    }
}
