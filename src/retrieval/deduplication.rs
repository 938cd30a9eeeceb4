//! Result deduplication by source reference

use crate::store::{ChunkId, ChunkStore};
use std::collections::HashSet;

/// Keep only the best-ranked chunk per `source_ref`
///
/// # Arguments
/// * `ranked` - (chunk_id, score) pairs, best first
///
/// # Returns
/// Deduplicated pairs, maintaining order. Ids unknown to the store are kept.
pub fn dedup_by_source(ranked: Vec<(ChunkId, f32)>, store: &ChunkStore) -> Vec<(ChunkId, f32)> {
    let mut seen: HashSet<&str> = HashSet::new();

    ranked
        .into_iter()
        .filter(|(chunk_id, _)| match store.get(*chunk_id) {
            Some(chunk) => seen.insert(chunk.source_ref.as_str()),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Chunk;
    use std::collections::BTreeMap;

    fn chunk(id: ChunkId, source_ref: &str) -> Chunk {
        Chunk {
            id,
            source_ref: source_ref.to_string(),
            title: None,
            article: None,
            text: String::new(),
            token_count: 1,
            embedding: vec![1.0],
            term_frequencies: BTreeMap::new(),
        }
    }

    #[test]
    fn test_deduplication() {
        let store = ChunkStore::new(
            1,
            vec![
                chunk(1, "Artículo 106"),
                chunk(2, "Artículo 107"),
                chunk(3, "Artículo 106"),
            ],
        )
        .unwrap();

        let deduped = dedup_by_source(vec![(3, 0.9), (2, 0.8), (1, 0.7)], &store);

        assert_eq!(deduped, vec![(3, 0.9), (2, 0.8)]); // Keeps first (highest score)
    }
}
