//! Chunk records and the immutable, versioned chunk store

use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::store::SnapshotError;

/// Stable chunk identifier
pub type ChunkId = u64;

/// One indexed passage of the corpus (an article or part of one)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    /// Human-readable article/section reference, e.g. "Artículo 106"
    pub source_ref: String,
    /// Section heading the passage belongs to
    pub title: Option<String>,
    /// Article number, used for direct reference lookup
    pub article: Option<u32>,
    pub text: String,
    /// Length under the generator's tokenizer
    pub token_count: usize,
    /// Unit-length embedding
    pub embedding: Vec<f32>,
    pub term_frequencies: BTreeMap<String, u32>,
}

impl Chunk {
    /// Indexed length: total number of analyzed tokens
    pub fn term_count(&self) -> u32 {
        self.term_frequencies.values().sum()
    }

    /// Distinct analyzed tokens
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.term_frequencies.keys().map(String::as_str)
    }
}

/// Immutable collection of chunks for one snapshot version.
///
/// Chunks are kept sorted by id. Embeddings are validated and normalized to unit
/// length on construction, so every consumer can treat inner product as cosine.
#[derive(Debug)]
pub struct ChunkStore {
    version: u64,
    chunks: Vec<Chunk>,
    positions: HashMap<ChunkId, usize>,
    articles: HashMap<u32, Vec<ChunkId>>,
    dimension: usize,
    avg_term_count: f32,
}

impl ChunkStore {
    pub fn new(version: u64, mut chunks: Vec<Chunk>) -> Result<Self, SnapshotError> {
        chunks.sort_by_key(|c| c.id);

        let dimension = chunks.first().map(|c| c.embedding.len()).unwrap_or(0);
        let mut positions = HashMap::with_capacity(chunks.len());
        let mut articles: HashMap<u32, Vec<ChunkId>> = HashMap::new();
        let mut total_terms = 0u64;

        for (position, chunk) in chunks.iter_mut().enumerate() {
            if positions.insert(chunk.id, position).is_some() {
                return Err(SnapshotError::DuplicateChunk(chunk.id));
            }

            if chunk.embedding.len() != dimension || dimension == 0 {
                return Err(SnapshotError::DimensionMismatch {
                    chunk_id: chunk.id,
                    expected: dimension,
                    actual: chunk.embedding.len(),
                });
            }

            if !normalize(&mut chunk.embedding) {
                return Err(SnapshotError::InvalidEmbedding(chunk.id));
            }

            if let Some(article) = chunk.article {
                articles.entry(article).or_default().push(chunk.id);
            }

            total_terms += u64::from(chunk.term_count());
        }

        let avg_term_count = if chunks.is_empty() {
            0.0
        } else {
            total_terms as f32 / chunks.len() as f32
        };

        Ok(Self {
            version,
            chunks,
            positions,
            articles,
            dimension,
            avg_term_count,
        })
    }

    /// A store with no chunks
    pub fn empty(version: u64) -> Self {
        Self {
            version,
            chunks: Vec::new(),
            positions: HashMap::new(),
            articles: HashMap::new(),
            dimension: 0,
            avg_term_count: 0.0,
        }
    }

    pub fn get(&self, id: ChunkId) -> Option<&Chunk> {
        self.positions.get(&id).map(|&position| &self.chunks[position])
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Chunks belonging to an article number, in id order
    pub fn article_chunks(&self, article: u32) -> &[ChunkId] {
        self.articles.get(&article).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Chunks in id order
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Embedding dimension (0 for an empty store)
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Mean indexed length, the BM25 `avgdl`
    pub fn avg_term_count(&self) -> f32 {
        self.avg_term_count
    }
}

/// Scale a vector to unit length in place. Returns false for zero or non-finite vectors.
pub fn normalize(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return false;
    }
    for x in vector.iter_mut() {
        *x /= norm;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: ChunkId, embedding: Vec<f32>) -> Chunk {
        let mut term_frequencies = BTreeMap::new();
        term_frequencies.insert("velocidad".to_string(), 2);
        term_frequencies.insert("limite".to_string(), 1);
        Chunk {
            id,
            source_ref: format!("Artículo {}", id),
            title: None,
            article: Some(id as u32),
            text: "límite de velocidad velocidad".to_string(),
            token_count: 5,
            embedding,
            term_frequencies,
        }
    }

    #[test]
    fn test_sorted_and_normalized() {
        let store =
            ChunkStore::new(3, vec![chunk(7, vec![3.0, 4.0]), chunk(2, vec![0.0, 2.0])]).unwrap();

        let ids: Vec<ChunkId> = store.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 7]);
        assert_eq!(store.version(), 3);
        assert_eq!(store.dimension(), 2);

        let embedding = &store.get(7).unwrap().embedding;
        assert!((embedding[0] - 0.6).abs() < 1e-6);
        assert!((embedding[1] - 0.8).abs() < 1e-6);
        assert_eq!(store.avg_term_count(), 3.0);
        assert_eq!(store.article_chunks(7), &[7]);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = ChunkStore::new(1, vec![chunk(1, vec![1.0]), chunk(1, vec![1.0])]);
        assert!(matches!(result, Err(SnapshotError::DuplicateChunk(1))));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let result = ChunkStore::new(1, vec![chunk(1, vec![1.0, 0.0]), chunk(2, vec![1.0])]);
        assert!(matches!(
            result,
            Err(SnapshotError::DimensionMismatch { chunk_id: 2, .. })
        ));
    }

    #[test]
    fn test_zero_embedding_rejected() {
        let result = ChunkStore::new(1, vec![chunk(1, vec![0.0, 0.0])]);
        assert!(matches!(result, Err(SnapshotError::InvalidEmbedding(1))));
    }

    #[test]
    fn test_empty_store() {
        let store = ChunkStore::new(1, Vec::new()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.dimension(), 0);
        assert!(store.get(1).is_none());
    }
}
