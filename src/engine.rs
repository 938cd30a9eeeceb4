//! Retrieval engine: query → fused ranking → rerank → compressed context

use crate::compression::{CompressedContext, ContextCompressor};
use crate::config::Config;
use crate::retrieval::{
    build_reranker, HybridRetriever, Query, RerankStage, Reranker, RetrievalError,
};
use crate::store::{IndexSnapshot, SnapshotHandle};
use std::sync::Arc;

/// Answers retrieval requests against the active snapshot.
///
/// Requests are independent and may run concurrently; each one pins the snapshot that
/// was active when it started, so a concurrent `swap_snapshot` never mixes versions
/// within a request.
pub struct RetrievalEngine {
    handle: SnapshotHandle,
    retriever: HybridRetriever,
    rerank: RerankStage,
    rerank_depth: usize,
    compressor: ContextCompressor,
}

impl RetrievalEngine {
    /// Engine with the reranker named in `config`
    pub fn from_config(snapshot: IndexSnapshot, config: &Config) -> Result<Self, RetrievalError> {
        let reranker = build_reranker(&config.rerank, snapshot.tokenizer().clone());
        Self::with_reranker(snapshot, config, reranker)
    }

    /// Engine with an explicit reranker; `config.rerank.model` is ignored
    pub fn with_reranker(
        snapshot: IndexSnapshot,
        config: &Config,
        reranker: Arc<dyn Reranker>,
    ) -> Result<Self, RetrievalError> {
        let tokenizer = snapshot.tokenizer().clone();
        Ok(Self {
            handle: SnapshotHandle::new(snapshot),
            retriever: HybridRetriever::new(config.retrieval.clone())?,
            rerank: RerankStage::new(reranker, config.rerank.timeout()),
            rerank_depth: config.rerank.depth,
            compressor: ContextCompressor::new(config.compression.clone(), tokenizer),
        })
    }

    /// Retrieve a context of at most `budget` tokens for `query`.
    ///
    /// `embedding` is the query's embedding; pass an empty slice for lexical-only
    /// retrieval. Deterministic for a fixed snapshot and configuration when the exact
    /// vector backend is used.
    pub async fn retrieve(
        &self,
        query: &str,
        embedding: &[f32],
        budget: usize,
    ) -> Result<CompressedContext, RetrievalError> {
        let snapshot = self.handle.current();
        if snapshot.store().is_empty() {
            return Ok(CompressedContext::empty_index());
        }

        let query = Query::parse(query, embedding, &snapshot)?;
        let mut ranked = self.retriever.retrieve(&snapshot, &query).await?;
        if ranked.is_empty() {
            tracing::debug!("No lexical or semantic overlap for query");
            return Ok(CompressedContext::no_overlap());
        }

        // Only the head is reranked; the tail follows it in fused order
        let tail = ranked.split_off(self.rerank_depth);
        let (mut reranked, outcome) = self.rerank.rerank(&query.text, ranked, &snapshot).await?;
        reranked.append(tail);

        let mut context = self
            .compressor
            .compress(&query.tokens, &reranked, snapshot.store(), budget)?;
        context.rerank = outcome;

        tracing::debug!(
            "Snapshot v{}: {} passages, {} tokens, {:?}",
            snapshot.version(),
            context.passages.len(),
            context.total_tokens,
            context.status
        );
        Ok(context)
    }

    /// The active snapshot
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.handle.current()
    }

    /// Install a rebuilt snapshot; requests already running keep the previous one
    pub fn swap_snapshot(&self, next: IndexSnapshot) -> Arc<IndexSnapshot> {
        self.handle.swap(next)
    }

    pub fn reranker_name(&self) -> &str {
        self.rerank.reranker().name()
    }
}
