//! HNSW vector index for approximate similarity search
use super::{sort_hits, IndexError, VectorIndex};
use crate::store::{ChunkId, ChunkStore};
use hnsw_rs::prelude::*;

/// Upper bound on graph layers accepted by hnsw_rs
const MAX_LAYERS: usize = 16;

/// Approximate nearest-neighbour index.
///
/// Recall depends on `ef_search`, and results may differ from `ExactVectorIndex` for
/// large corpora. Scores are cosine similarity (1 - cosine distance).
pub struct HnswVectorIndex {
    index: Hnsw<'static, f32, DistCosine>,
    dimension: usize,
    count: usize,
    ef_search: usize,
}

impl HnswVectorIndex {
    /// # Arguments
    /// * `m` - connections per node per layer
    /// * `ef_construction` - candidate list size while building (higher = better recall)
    /// * `ef_search` - candidate list size while searching
    pub fn build(store: &ChunkStore, m: usize, ef_construction: usize, ef_search: usize) -> Self {
        let index = Hnsw::<f32, DistCosine>::new(
            m,
            store.len().max(1),
            MAX_LAYERS,
            ef_construction,
            DistCosine,
        );

        for chunk in store.iter() {
            index.insert((&chunk.embedding, chunk.id as usize));
        }

        Self {
            index,
            dimension: store.dimension(),
            count: store.len(),
            ef_search,
        }
    }
}

impl VectorIndex for HnswVectorIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ChunkId, f32)>, IndexError> {
        if self.count == 0 || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<(ChunkId, f32)> = self
            .index
            .search(query, k, self.ef_search.max(k))
            .into_iter()
            .map(|neighbour| (neighbour.d_id as ChunkId, 1.0 - neighbour.distance))
            .collect();

        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn backend(&self) -> &'static str {
        "hnsw"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Chunk;
    use std::collections::BTreeMap;

    fn store(embeddings: Vec<Vec<f32>>) -> ChunkStore {
        let chunks = embeddings
            .into_iter()
            .enumerate()
            .map(|(i, embedding)| Chunk {
                id: i as ChunkId + 100,
                source_ref: format!("Artículo {}", i),
                title: None,
                article: None,
                text: String::new(),
                token_count: 0,
                embedding,
                term_frequencies: BTreeMap::new(),
            })
            .collect();
        ChunkStore::new(1, chunks).unwrap()
    }

    #[test]
    fn test_finds_nearest_in_small_corpus() {
        let index = HnswVectorIndex::build(
            &store(vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
                vec![0.9, 0.1, 0.0],
            ]),
            16,
            200,
            64,
        );

        let hits = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 100);
        assert!((hits[0].1 - 1.0).abs() < 1e-4);
        assert_eq!(hits[1].0, 103);
    }

    #[test]
    fn test_wrong_dimension() {
        let index = HnswVectorIndex::build(&store(vec![vec![1.0, 0.0]]), 16, 200, 64);
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_empty_index() {
        let index = HnswVectorIndex::build(&ChunkStore::empty(1), 16, 200, 64);
        assert!(index.search(&[1.0, 0.0], 3).unwrap().is_empty());
    }
}
