//! Exact (brute-force) cosine search
use super::{sort_hits, IndexError, VectorIndex};
use crate::store::{ChunkId, ChunkStore};
use ndarray::{Array2, ArrayView1};

/// Dense row-per-chunk matrix of unit embeddings. Scores are a single
/// matrix-vector product, so results are exact and deterministic.
pub struct ExactVectorIndex {
    ids: Vec<ChunkId>,
    matrix: Array2<f32>,
    dimension: usize,
}

impl ExactVectorIndex {
    pub fn build(store: &ChunkStore) -> Self {
        let dimension = store.dimension();
        let ids: Vec<ChunkId> = store.iter().map(|c| c.id).collect();
        let mut matrix = Array2::<f32>::zeros((ids.len(), dimension));

        for (i, chunk) in store.iter().enumerate() {
            matrix
                .row_mut(i)
                .assign(&ArrayView1::from(chunk.embedding.as_slice()));
        }

        Self {
            ids,
            matrix,
            dimension,
        }
    }
}

impl VectorIndex for ExactVectorIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ChunkId, f32)>, IndexError> {
        if self.ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(IndexError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let scores = self.matrix.dot(&ArrayView1::from(query));
        let mut hits: Vec<(ChunkId, f32)> = self
            .ids
            .iter()
            .copied()
            .zip(scores.iter().copied())
            .collect();

        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn backend(&self) -> &'static str {
        "exact"
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
                id: i as ChunkId + 1,
                source_ref: format!("Artículo {}", i + 1),
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
    fn test_search_orders_by_similarity() {
        let index = ExactVectorIndex::build(&store(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.7, 0.7, 0.0],
        ]));

        let hits = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 1);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].0, 3);
    }

    #[test]
    fn test_ties_break_by_id() {
        let index = ExactVectorIndex::build(&store(vec![vec![0.0, 1.0], vec![0.0, 1.0]]));
        let hits = index.search(&[0.0, 1.0], 5).unwrap();
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_wrong_dimension() {
        let index = ExactVectorIndex::build(&store(vec![vec![1.0, 0.0]]));
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 1),
            Err(IndexError::InvalidDimension {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_empty_index() {
        let index = ExactVectorIndex::build(&ChunkStore::empty(1));
        assert_eq!(index.dimension(), 0);
        assert!(index.search(&[1.0], 3).unwrap().is_empty());
    }
}
