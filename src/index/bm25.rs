//! Okapi BM25 over the chunks' precomputed term frequencies
use super::{IndexError, LexicalIndex};
use crate::store::{ChunkId, ChunkStore};
use ahash::{HashMap, HashMapExt};
use std::collections::HashMap as StdHashMap;

struct Posting {
    chunk_id: ChunkId,
    term_frequency: u32,
}

pub struct Bm25Index {
    /// term -> postings in ascending chunk id order
    postings: HashMap<String, Vec<Posting>>,
    lengths: HashMap<ChunkId, u32>,
    num_docs: usize,
    avg_length: f32,
    k1: f32,
    b: f32,
}

impl Bm25Index {
    pub fn build(store: &ChunkStore, k1: f32, b: f32) -> Self {
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut lengths = HashMap::with_capacity(store.len());

        for chunk in store.iter() {
            lengths.insert(chunk.id, chunk.term_count());
            for (term, &term_frequency) in &chunk.term_frequencies {
                if term_frequency == 0 {
                    continue;
                }
                postings.entry(term.clone()).or_default().push(Posting {
                    chunk_id: chunk.id,
                    term_frequency,
                });
            }
        }

        tracing::debug!(
            "BM25 index: {} docs, {} terms, avgdl {:.1}",
            store.len(),
            postings.len(),
            store.avg_term_count()
        );

        Self {
            postings,
            lengths,
            num_docs: store.len(),
            avg_length: store.avg_term_count(),
            k1,
            b,
        }
    }

    /// Never negative, even for terms present in more than half of the corpus
    fn idf(&self, document_frequency: usize) -> f32 {
        let n = self.num_docs as f32;
        let df = document_frequency as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln().max(0.0)
    }

    fn length_norm(&self, chunk_id: ChunkId) -> f32 {
        if self.avg_length <= 0.0 {
            return 1.0;
        }
        let length = self.lengths.get(&chunk_id).copied().unwrap_or(0) as f32;
        1.0 - self.b + self.b * length / self.avg_length
    }
}

impl LexicalIndex for Bm25Index {
    fn score(&self, tokens: &[String]) -> Result<StdHashMap<ChunkId, f32>, IndexError> {
        let mut scores = StdHashMap::new();

        // Repeated query tokens contribute once per occurrence
        for token in tokens {
            let Some(postings) = self.postings.get(token) else {
                continue;
            };
            let idf = self.idf(postings.len());

            for posting in postings {
                let tf = posting.term_frequency as f32;
                let denominator = tf + self.k1 * self.length_norm(posting.chunk_id);
                let contribution = idf * tf * (self.k1 + 1.0) / denominator;
                *scores.entry(posting.chunk_id).or_insert(0.0) += contribution;
            }
        }

        Ok(scores)
    }

    fn backend(&self) -> &'static str {
        "bm25"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Chunk;
    use crate::text::Tokenizer;

    fn store(texts: &[&str]) -> ChunkStore {
        let tokenizer = Tokenizer::default();
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                id: i as ChunkId + 1,
                source_ref: format!("C{}", i + 1),
                title: None,
                article: None,
                text: text.to_string(),
                token_count: text.split_whitespace().count(),
                embedding: vec![1.0, i as f32],
                term_frequencies: tokenizer.term_frequencies(text),
            })
            .collect();
        ChunkStore::new(1, chunks).unwrap()
    }

    #[test]
    fn test_matching_chunk_ranks_first() {
        let store = store(&[
            "speed limit urban 30 km/h",
            "speed limit highway 120 km/h",
            "parking rules downtown",
        ]);
        let index = Bm25Index::build(&store, 1.2, 0.75);
        let tokens = Tokenizer::default().tokenize("what is the urban speed limit");

        let scores = index.score(&tokens).unwrap();
        assert!(scores[&1] > scores[&2]);
        assert!(!scores.contains_key(&3));
    }

    #[test]
    fn test_unknown_terms_score_nothing() {
        let store = store(&["licencia de conducción"]);
        let index = Bm25Index::build(&store, 1.2, 0.75);
        assert!(index.score(&["semaforo".to_string()]).unwrap().is_empty());
        assert!(index.score(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_scores_non_negative_for_common_terms() {
        let store = store(&["multa grave", "multa leve", "multa", "licencia"]);
        let index = Bm25Index::build(&store, 1.2, 0.75);
        let scores = index.score(&["multa".to_string()]).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.values().all(|&s| s >= 0.0));
    }

    #[test]
    fn test_repeated_query_token_counts_per_occurrence() {
        let store = store(&["multa grave", "licencia"]);
        let index = Bm25Index::build(&store, 1.2, 0.75);
        let once = index.score(&["multa".to_string()]).unwrap()[&1];
        let twice = index
            .score(&["multa".to_string(), "multa".to_string()])
            .unwrap()[&1];
        assert!((twice - 2.0 * once).abs() < 1e-5);
    }
}
