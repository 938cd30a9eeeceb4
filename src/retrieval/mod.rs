//! Hybrid retrieval and reranking
//!
//! A query is scored by the lexical and vector indexes of one snapshot concurrently,
//! the two candidate streams are normalized and fused into a single ranking, and an
//! optional reranker reorders the head of that ranking.

mod deduplication;
mod fusion;
mod hybrid;
mod references;
mod reranker;

pub use deduplication::dedup_by_source;
pub use fusion::{
    normalize_min_max, reciprocal_rank_fusion, weighted_fusion, FusionConfig, FusionError,
};
pub use hybrid::HybridRetriever;
pub use references::{extract_article_numbers, parse_article};
pub use reranker::{
    build_reranker, CoverageReranker, CrossEncoderReranker, PassThroughReranker, RerankError,
    RerankOutcome, RerankStage, Reranker,
};

use crate::index::{sort_hits, IndexError};
use crate::store::{normalize, ChunkId, IndexSnapshot};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Chunk {chunk_id} is not in snapshot v{version}")]
    IndexInconsistent { chunk_id: ChunkId, version: u64 },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Index error: {0}")]
    IndexError(#[from] IndexError),

    #[error("Fusion error: {0}")]
    FusionError(#[from] FusionError),

    #[error("Search task failed: {0}")]
    TaskError(String),
}

/// A parsed query, valid for one call against one snapshot
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    /// Analyzed tokens, duplicates kept
    pub tokens: Vec<String>,
    /// Unit-length embedding, `None` when there is no semantic signal
    pub embedding: Option<Vec<f32>>,
    /// Article numbers cited in the text
    pub articles: Vec<u32>,
}

impl Query {
    /// Analyze `text` with the snapshot's tokenizer and validate `embedding` against the
    /// snapshot's dimension.
    ///
    /// An empty embedding means lexical-only retrieval. A zero or non-finite one is
    /// treated the same way. A dimension mismatch is an error unless the snapshot is empty.
    pub fn parse(
        text: &str,
        embedding: &[f32],
        snapshot: &IndexSnapshot,
    ) -> Result<Self, RetrievalError> {
        let tokens = snapshot.tokenizer().tokenize(text);
        let articles = extract_article_numbers(text);
        let dimension = snapshot.store().dimension();

        let embedding = if embedding.is_empty() || snapshot.store().is_empty() {
            None
        } else if embedding.len() != dimension {
            return Err(RetrievalError::InvalidQuery(format!(
                "embedding has dimension {}, snapshot v{} expects {}",
                embedding.len(),
                snapshot.version(),
                dimension
            )));
        } else {
            let mut unit = embedding.to_vec();
            if normalize(&mut unit) {
                Some(unit)
            } else {
                tracing::warn!("Query embedding is zero or non-finite, using lexical scores only");
                None
            }
        };

        Ok(Self {
            text: text.to_string(),
            tokens,
            embedding,
            articles,
        })
    }
}

/// One fused candidate before ranking
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub chunk_id: ChunkId,
    /// Normalized lexical score, 0 when the lexical stream did not return the chunk
    pub lexical_score: f32,
    /// Normalized semantic score, 0 when the vector stream did not return the chunk
    pub semantic_score: f32,
    pub fused_score: f32,
}

/// One position of a ranking
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedEntry {
    pub chunk_id: ChunkId,
    pub score: f32,
    /// 0-based, gapless
    pub rank: usize,
}

/// Ranking with non-increasing scores; `from_scores` breaks ties by lower chunk id
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankedResult {
    entries: Vec<RankedEntry>,
}

impl RankedResult {
    /// Sort `(chunk_id, score)` pairs and assign ranks
    pub fn from_scores(mut scores: Vec<(ChunkId, f32)>) -> Self {
        sort_hits(&mut scores);
        let entries = scores
            .into_iter()
            .enumerate()
            .map(|(rank, (chunk_id, score))| RankedEntry {
                chunk_id,
                score,
                rank,
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[RankedEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &RankedEntry> {
        self.entries.iter()
    }

    pub fn ids(&self) -> Vec<ChunkId> {
        self.entries.iter().map(|e| e.chunk_id).collect()
    }

    /// Keep the first `n` entries
    pub fn truncate(&mut self, n: usize) {
        self.entries.truncate(n);
    }

    /// Split off everything from position `at` onward, leaving the head in `self`
    pub fn split_off(&mut self, at: usize) -> RankedResult {
        let at = at.min(self.entries.len());
        let mut tail = Self {
            entries: self.entries.split_off(at),
        };
        tail.renumber();
        tail
    }

    /// Place `tail` after the current entries, keeping its order.
    ///
    /// Ranks continue from the head. Tail scores are capped at the score before them so
    /// scores stay non-increasing when the head was rescored on a different scale.
    pub fn append(&mut self, tail: RankedResult) {
        let mut ceiling = self.entries.last().map_or(f32::INFINITY, |e| e.score);
        for mut entry in tail.entries {
            entry.score = entry.score.min(ceiling);
            ceiling = entry.score;
            self.entries.push(entry);
        }
        self.renumber();
    }

    fn renumber(&mut self) {
        for (rank, entry) in self.entries.iter_mut().enumerate() {
            entry.rank = rank;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LexicalConfig, VectorConfig};
    use crate::store::{Chunk, SnapshotBuilder};
    use std::collections::BTreeMap;

    fn snapshot() -> IndexSnapshot {
        let chunk = Chunk {
            id: 1,
            source_ref: "Artículo 1".to_string(),
            title: None,
            article: Some(1),
            text: "multa".to_string(),
            token_count: 1,
            embedding: vec![1.0, 0.0],
            term_frequencies: BTreeMap::from([("multa".to_string(), 1)]),
        };
        SnapshotBuilder::new(LexicalConfig::default(), VectorConfig::default())
            .build(1, vec![chunk])
            .unwrap()
    }

    #[test]
    fn test_ranks_are_gapless_with_id_ties() {
        let ranked = RankedResult::from_scores(vec![(9, 0.2), (4, 0.7), (2, 0.7), (5, 1.0)]);
        assert_eq!(ranked.ids(), vec![5, 2, 4, 9]);
        let ranks: Vec<usize> = ranked.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_split_and_append_restores_ranking() {
        let original = RankedResult::from_scores(vec![(1, 0.9), (2, 0.8), (3, 0.5), (4, 0.1)]);
        let mut head = original.clone();
        let tail = head.split_off(2);
        assert_eq!(head.ids(), vec![1, 2]);
        assert_eq!(tail.ids(), vec![3, 4]);
        assert_eq!(tail.entries()[0].rank, 0);

        head.append(tail);
        assert_eq!(head, original);

        let mut all = original.clone();
        assert!(all.split_off(10).is_empty());
        assert_eq!(all, original);
    }

    #[test]
    fn test_append_caps_tail_scores() {
        // Head rescored on a smaller scale than the fused tail
        let mut head = RankedResult::from_scores(vec![(2, 0.3), (1, 0.05)]);
        head.append(RankedResult::from_scores(vec![(3, 0.5), (4, 0.01)]));

        assert_eq!(head.ids(), vec![2, 1, 3, 4]);
        let ranks: Vec<usize> = head.iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
        assert_eq!(head.entries()[2].score, 0.05);
        assert_eq!(head.entries()[3].score, 0.01);
    }

    #[test]
    fn test_query_normalizes_embedding() {
        let query = Query::parse("Artículo 131 multa", &[3.0, 4.0], &snapshot()).unwrap();
        let embedding = query.embedding.unwrap();
        assert!((embedding[0] - 0.6).abs() < 1e-6);
        assert_eq!(query.articles, vec![131]);
        assert!(query.tokens.contains(&"multa".to_string()));
    }

    #[test]
    fn test_query_degraded_embeddings() {
        let snapshot = snapshot();
        assert!(Query::parse("multa", &[], &snapshot)
            .unwrap()
            .embedding
            .is_none());
        assert!(Query::parse("multa", &[0.0, 0.0], &snapshot)
            .unwrap()
            .embedding
            .is_none());
        assert!(Query::parse("multa", &[f32::NAN, 1.0], &snapshot)
            .unwrap()
            .embedding
            .is_none());
    }

    #[test]
    fn test_query_dimension_mismatch() {
        assert!(matches!(
            Query::parse("multa", &[1.0, 0.0, 0.0], &snapshot()),
            Err(RetrievalError::InvalidQuery(_))
        ));
    }
}
