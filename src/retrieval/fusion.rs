//! Score fusion: weighted min-max combination and Reciprocal Rank Fusion

use crate::config::{FusionStrategy, RetrievalConfig};
use crate::retrieval::ScoredCandidate;
use crate::store::ChunkId;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid weight configuration: weights must be finite, non-negative and not both zero")]
    InvalidWeights,

    #[error("Invalid RRF constant: {0}")]
    InvalidRrfK(f32),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub strategy: FusionStrategy,

    /// RRF K constant (typically 60)
    pub rrf_k: f32,

    /// Weight for semantic results (α)
    pub semantic_weight: f32,

    /// Weight for lexical results (β)
    pub lexical_weight: f32,
}

impl FusionConfig {
    pub fn new(
        strategy: FusionStrategy,
        rrf_k: f32,
        semantic_weight: f32,
        lexical_weight: f32,
    ) -> Result<Self, FusionError> {
        let valid = |w: f32| w.is_finite() && w >= 0.0;
        if !valid(semantic_weight)
            || !valid(lexical_weight)
            || semantic_weight + lexical_weight <= 0.0
        {
            return Err(FusionError::InvalidWeights);
        }
        if !rrf_k.is_finite() || rrf_k < 0.0 {
            return Err(FusionError::InvalidRrfK(rrf_k));
        }

        Ok(Self {
            strategy,
            rrf_k,
            semantic_weight,
            lexical_weight,
        })
    }

    pub fn from_retrieval(config: &RetrievalConfig) -> Result<Self, FusionError> {
        Self::new(
            config.fusion,
            config.rrf_k,
            config.semantic_weight,
            config.lexical_weight,
        )
    }

    /// Fuse two best-first candidate lists with the configured strategy
    pub fn fuse(
        &self,
        semantic: &[(ChunkId, f32)],
        lexical: &[(ChunkId, f32)],
    ) -> Vec<ScoredCandidate> {
        match self.strategy {
            FusionStrategy::Weighted => weighted_fusion(semantic, lexical, self),
            FusionStrategy::Rrf => reciprocal_rank_fusion(semantic, lexical, self),
        }
    }

    /// Highest score fusion can produce: a chunk best in both streams
    pub fn max_score(&self) -> f32 {
        match self.strategy {
            FusionStrategy::Weighted => self.semantic_weight + self.lexical_weight,
            FusionStrategy::Rrf => (self.semantic_weight + self.lexical_weight) / (self.rrf_k + 1.0),
        }
    }
}

/// Rescale scores to [0, 1] over the candidates given.
///
/// With fewer than two candidates, or when every score is equal, all scores become 1.0.
pub fn normalize_min_max(scores: &[(ChunkId, f32)]) -> HashMap<ChunkId, f32> {
    let min = scores.iter().map(|s| s.1).fold(f32::INFINITY, f32::min);
    let max = scores.iter().map(|s| s.1).fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    scores
        .iter()
        .map(|&(id, score)| {
            let normalized = if scores.len() < 2 || range <= f32::EPSILON || !range.is_finite() {
                1.0
            } else {
                (score - min) / range
            };
            (id, normalized)
        })
        .collect()
}

/// `α·norm_semantic + β·norm_lexical`, a missing term counting as 0
pub fn weighted_fusion(
    semantic: &[(ChunkId, f32)],
    lexical: &[(ChunkId, f32)],
    config: &FusionConfig,
) -> Vec<ScoredCandidate> {
    let semantic = normalize_min_max(semantic);
    let lexical = normalize_min_max(lexical);

    combine(&semantic, &lexical, |s, l| {
        config.semantic_weight * s + config.lexical_weight * l
    })
}

/// Apply Reciprocal Rank Fusion to combine two ranked lists
///
/// RRF formula: score(id) = sum over all rankings of: weight / (k + rank + 1)
///
/// Candidate scores are replaced by their reciprocal-rank contribution, so
/// `semantic_score`/`lexical_score` of the result hold the per-stream RRF terms.
pub fn reciprocal_rank_fusion(
    semantic: &[(ChunkId, f32)],
    lexical: &[(ChunkId, f32)],
    config: &FusionConfig,
) -> Vec<ScoredCandidate> {
    let reciprocal = |results: &[(ChunkId, f32)]| -> HashMap<ChunkId, f32> {
        results
            .iter()
            .enumerate()
            .map(|(rank, &(id, _))| (id, 1.0 / (config.rrf_k + rank as f32 + 1.0)))
            .collect()
    };

    combine(&reciprocal(semantic), &reciprocal(lexical), |s, l| {
        config.semantic_weight * s + config.lexical_weight * l
    })
}

fn combine(
    semantic: &HashMap<ChunkId, f32>,
    lexical: &HashMap<ChunkId, f32>,
    fuse: impl Fn(f32, f32) -> f32,
) -> Vec<ScoredCandidate> {
    let mut ids: Vec<ChunkId> = semantic.keys().chain(lexical.keys()).copied().collect();
    ids.sort_unstable();
    ids.dedup();

    ids.into_iter()
        .map(|chunk_id| {
            let semantic_score = semantic.get(&chunk_id).copied().unwrap_or(0.0);
            let lexical_score = lexical.get(&chunk_id).copied().unwrap_or(0.0);
            ScoredCandidate {
                chunk_id,
                lexical_score,
                semantic_score,
                fused_score: fuse(semantic_score, lexical_score),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weighted(alpha: f32, beta: f32) -> FusionConfig {
        FusionConfig::new(FusionStrategy::Weighted, 60.0, alpha, beta).unwrap()
    }

    fn fused(candidates: &[ScoredCandidate], id: ChunkId) -> f32 {
        candidates
            .iter()
            .find(|c| c.chunk_id == id)
            .map(|c| c.fused_score)
            .unwrap()
    }

    #[test]
    fn test_min_max() {
        let normalized = normalize_min_max(&[(1, 4.0), (2, 2.0), (3, 3.0)]);
        assert_eq!(normalized[&1], 1.0);
        assert_eq!(normalized[&2], 0.0);
        assert_eq!(normalized[&3], 0.5);
    }

    #[test]
    fn test_min_max_degenerate_streams() {
        assert_eq!(normalize_min_max(&[(7, 0.3)])[&7], 1.0);
        let equal = normalize_min_max(&[(1, 0.5), (2, 0.5)]);
        assert_eq!(equal[&1], 1.0);
        assert_eq!(equal[&2], 1.0);
        assert!(normalize_min_max(&[]).is_empty());
    }

    #[test]
    fn test_weighted_missing_term_is_zero() {
        let semantic = [(1, 0.9), (2, 0.1)];
        let lexical = [(2, 5.0), (3, 1.0)];
        let fused_candidates = weighted_fusion(&semantic, &lexical, &weighted(0.5, 0.5));

        assert_eq!(fused_candidates.len(), 3);
        assert_eq!(fused(&fused_candidates, 1), 0.5);
        assert_eq!(fused(&fused_candidates, 2), 0.5);
        assert_eq!(fused(&fused_candidates, 3), 0.0);
    }

    #[test]
    fn test_rrf_basic() {
        let semantic = [(1, 0.9), (2, 0.8), (3, 0.7)];
        let keyword = [(2, 0.95), (1, 0.85), (4, 0.75)];

        let config = FusionConfig::new(FusionStrategy::Rrf, 60.0, 1.0, 1.0).unwrap();
        let fused_candidates = reciprocal_rank_fusion(&semantic, &keyword, &config);

        assert_eq!(fused_candidates.len(), 4);
        // IDs 1 and 2 appear in both lists
        assert!(fused(&fused_candidates, 1) > fused(&fused_candidates, 3));
        assert_eq!(fused(&fused_candidates, 1), fused(&fused_candidates, 2));
        assert!((config.max_score() - 2.0 / 61.0).abs() < 1e-7);
    }

    #[test]
    fn test_rrf_weighted() {
        let config = FusionConfig::new(FusionStrategy::Rrf, 60.0, 0.7, 0.3).unwrap();
        let fused_candidates = reciprocal_rank_fusion(&[(1, 0.9)], &[(2, 0.9)], &config);
        assert!(fused(&fused_candidates, 1) > fused(&fused_candidates, 2));
    }

    #[test]
    fn test_invalid_weights() {
        assert!(FusionConfig::new(FusionStrategy::Weighted, 60.0, 0.0, 0.0).is_err());
        assert!(FusionConfig::new(FusionStrategy::Weighted, 60.0, -0.1, 1.0).is_err());
        assert!(FusionConfig::new(FusionStrategy::Weighted, 60.0, f32::NAN, 1.0).is_err());
        assert!(FusionConfig::new(FusionStrategy::Weighted, 60.0, 0.0, 1.0).is_ok());
    }
}
