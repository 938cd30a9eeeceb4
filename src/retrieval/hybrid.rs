//! Hybrid search combining semantic and lexical scoring

use crate::config::RetrievalConfig;
use crate::index::sort_hits;
use crate::retrieval::{
    dedup_by_source, FusionConfig, Query, RankedResult, RetrievalError, ScoredCandidate,
};
use crate::store::{ChunkId, IndexSnapshot};
use std::sync::Arc;

/// Hybrid retriever over one snapshot at a time
#[derive(Debug, Clone)]
pub struct HybridRetriever {
    config: RetrievalConfig,
    fusion: FusionConfig,
}

impl HybridRetriever {
    pub fn new(config: RetrievalConfig) -> Result<Self, RetrievalError> {
        let fusion = FusionConfig::from_retrieval(&config)?;
        Ok(Self { config, fusion })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Fused ranking of at most `top_k` chunks.
    ///
    /// Every id in the result exists in `snapshot`. An empty snapshot, or a query with
    /// neither lexical nor semantic overlap, yields an empty ranking.
    pub async fn retrieve(
        &self,
        snapshot: &Arc<IndexSnapshot>,
        query: &Query,
    ) -> Result<RankedResult, RetrievalError> {
        if snapshot.store().is_empty() || self.config.top_k == 0 {
            return Ok(RankedResult::default());
        }

        // Step 1: Parallel lexical + semantic search
        let (lexical, semantic) = tokio::join!(
            self.lexical_search(snapshot, query),
            self.semantic_search(snapshot, query)
        );
        let lexical = lexical?;
        let mut semantic = semantic?;

        // Step 2: Minimum semantic evidence
        semantic.retain(|&(_, similarity)| similarity >= self.config.min_semantic_score);

        tracing::debug!(
            "Snapshot v{}: {} lexical, {} semantic candidates",
            snapshot.version(),
            lexical.len(),
            semantic.len()
        );

        // Step 3: Fusion
        let mut candidates = self.fusion.fuse(&semantic, &lexical);

        // Step 4: Cited articles take the top fused score; ties with other top chunks go by id
        if self.config.direct_reference && !query.articles.is_empty() {
            self.boost_cited_articles(snapshot, query, &mut candidates);
        }

        let mut fused: Vec<(ChunkId, f32)> = candidates
            .into_iter()
            .map(|c| (c.chunk_id, c.fused_score))
            .collect();
        sort_hits(&mut fused);

        // Step 5: Every candidate must resolve in the snapshot it came from
        let store = snapshot.store();
        if let Some(&(chunk_id, _)) = fused.iter().find(|(id, _)| !store.contains(*id)) {
            return Err(RetrievalError::IndexInconsistent {
                chunk_id,
                version: snapshot.version(),
            });
        }

        // Step 6: One passage per source if requested
        if self.config.dedup_by_source {
            fused = dedup_by_source(fused, store);
        }

        let mut ranked = RankedResult::from_scores(fused);
        ranked.truncate(self.config.top_k);

        tracing::debug!("Fused ranking: {} candidates", ranked.len());
        Ok(ranked)
    }

    /// Lexical scores, best `top_k` first
    async fn lexical_search(
        &self,
        snapshot: &Arc<IndexSnapshot>,
        query: &Query,
    ) -> Result<Vec<(ChunkId, f32)>, RetrievalError> {
        if query.tokens.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = Arc::clone(snapshot);
        let tokens = query.tokens.clone();
        let top_k = self.config.top_k;

        tokio::task::spawn_blocking(move || -> Result<Vec<(ChunkId, f32)>, RetrievalError> {
            let mut hits: Vec<(ChunkId, f32)> =
                snapshot.lexical().score(&tokens)?.into_iter().collect();
            sort_hits(&mut hits);
            hits.truncate(top_k);
            Ok(hits)
        })
        .await
        .map_err(|e| RetrievalError::TaskError(e.to_string()))?
    }

    /// Nearest neighbours of the query embedding, best first
    async fn semantic_search(
        &self,
        snapshot: &Arc<IndexSnapshot>,
        query: &Query,
    ) -> Result<Vec<(ChunkId, f32)>, RetrievalError> {
        let Some(embedding) = query.embedding.clone() else {
            return Ok(Vec::new());
        };

        let snapshot = Arc::clone(snapshot);
        let top_k = self.config.top_k;

        tokio::task::spawn_blocking(move || -> Result<Vec<(ChunkId, f32)>, RetrievalError> {
            Ok(snapshot.vector().search(&embedding, top_k)?)
        })
        .await
        .map_err(|e| RetrievalError::TaskError(e.to_string()))?
    }

    fn boost_cited_articles(
        &self,
        snapshot: &IndexSnapshot,
        query: &Query,
        candidates: &mut Vec<ScoredCandidate>,
    ) {
        let max_score = self.fusion.max_score();

        for &article in &query.articles {
            for &chunk_id in snapshot.store().article_chunks(article) {
                match candidates.iter_mut().find(|c| c.chunk_id == chunk_id) {
                    Some(candidate) => candidate.fused_score = max_score,
                    None => candidates.push(ScoredCandidate {
                        chunk_id,
                        lexical_score: 0.0,
                        semantic_score: 0.0,
                        fused_score: max_score,
                    }),
                }
                tracing::debug!("Article {} cited, chunk {} set to top score", article, chunk_id);
            }
        }
    }
}
