//! Token-budgeted context assembly
//!
//! The compressor walks a ranking best-first and selects passages that fit the
//! remaining budget, skipping near-duplicates of passages already selected. With the
//! `sentences` truncation policy a passage that does not fit may be cut down to its
//! most relevant sentences instead of being skipped.

mod sentences;

use crate::config::{CompressionConfig, TruncationPolicy};
use crate::retrieval::{RankedResult, RerankOutcome, RetrievalError};
use crate::store::{Chunk, ChunkId, ChunkStore};
use crate::text::Tokenizer;
use serde::Serialize;
use std::collections::BTreeSet;

/// Why a context is (or is not) grounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextStatus {
    Grounded,
    /// The active snapshot has no chunks
    EmptyIndex,
    /// No chunk matched the query lexically or semantically
    NoOverlap,
    /// Candidates exist but none fits the budget
    BudgetTooSmall,
}

/// One selected passage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPassage {
    pub chunk_id: ChunkId,
    pub source_ref: String,
    pub title: Option<String>,
    pub text: String,
    pub token_count: usize,
    /// Cut down to its best sentences
    pub truncated: bool,
}

/// Final context handed to the generator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressedContext {
    /// Selected passages in rank order
    pub passages: Vec<ContextPassage>,
    /// Never exceeds the budget
    pub total_tokens: usize,
    pub status: ContextStatus,
    pub rerank: RerankOutcome,
}

impl CompressedContext {
    fn empty(status: ContextStatus) -> Self {
        Self {
            passages: Vec::new(),
            total_tokens: 0,
            status,
            rerank: RerankOutcome::Skipped,
        }
    }

    pub fn empty_index() -> Self {
        Self::empty(ContextStatus::EmptyIndex)
    }

    pub fn no_overlap() -> Self {
        Self::empty(ContextStatus::NoOverlap)
    }

    pub fn budget_too_small() -> Self {
        Self::empty(ContextStatus::BudgetTooSmall)
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.passages.iter().map(|p| p.chunk_id).collect()
    }

    /// Plain-text context block, one `[source_ref]` section per passage
    pub fn render(&self) -> String {
        self.passages
            .iter()
            .map(|p| format!("[{}]\n{}", p.source_ref, p.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Jaccard similarity of two term sets; 0 when both are empty
pub fn jaccard<'a>(a: &BTreeSet<&'a str>, b: &BTreeSet<&'a str>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

#[derive(Debug, Clone)]
pub struct ContextCompressor {
    config: CompressionConfig,
    tokenizer: Tokenizer,
}

impl ContextCompressor {
    pub fn new(config: CompressionConfig, tokenizer: Tokenizer) -> Self {
        Self { config, tokenizer }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Select passages from `ranked` within `budget` tokens.
    ///
    /// `query_tokens` are only used by sentence truncation. Every ranked id must exist in
    /// `store`; otherwise the whole call fails with `RetrievalError::IndexInconsistent`.
    pub fn compress(
        &self,
        query_tokens: &[String],
        ranked: &RankedResult,
        store: &ChunkStore,
        budget: usize,
    ) -> Result<CompressedContext, RetrievalError> {
        if store.is_empty() {
            return Ok(CompressedContext::empty_index());
        }
        if ranked.is_empty() {
            return Ok(CompressedContext::no_overlap());
        }

        let chunks = ranked
            .iter()
            .map(|entry| {
                store
                    .get(entry.chunk_id)
                    .ok_or(RetrievalError::IndexInconsistent {
                        chunk_id: entry.chunk_id,
                        version: store.version(),
                    })
            })
            .collect::<Result<Vec<&Chunk>, _>>()?;

        let mut remaining = budget;
        let mut passages = Vec::new();
        let mut selected_terms: Vec<BTreeSet<&str>> = Vec::new();

        for chunk in chunks {
            if remaining == 0 {
                break;
            }

            let terms: BTreeSet<&str> = chunk.terms().collect();
            if let Some(similarity) = selected_terms
                .iter()
                .map(|selected| jaccard(&terms, selected))
                .find(|&similarity| similarity >= self.config.duplicate_threshold)
            {
                tracing::debug!(
                    "Skipping chunk {}: near-duplicate (jaccard {:.2})",
                    chunk.id,
                    similarity
                );
                continue;
            }

            let passage = if chunk.token_count <= remaining {
                Some(full_passage(chunk))
            } else {
                self.truncated_passage(chunk, query_tokens, remaining)
            };

            if let Some(passage) = passage {
                remaining -= passage.token_count;
                passages.push(passage);
                selected_terms.push(terms);
            }
        }

        let total_tokens = budget - remaining;
        tracing::debug!(
            "Compressed {} candidates into {} passages ({} / {} tokens)",
            ranked.len(),
            passages.len(),
            total_tokens,
            budget
        );

        if passages.is_empty() {
            return Ok(CompressedContext::budget_too_small());
        }

        Ok(CompressedContext {
            passages,
            total_tokens,
            status: ContextStatus::Grounded,
            rerank: RerankOutcome::Skipped,
        })
    }

    fn truncated_passage(
        &self,
        chunk: &Chunk,
        query_tokens: &[String],
        remaining: usize,
    ) -> Option<ContextPassage> {
        if self.config.truncation != TruncationPolicy::Sentences
            || remaining < self.config.min_partial_tokens
        {
            return None;
        }

        let (text, token_count) =
            sentences::truncate(chunk, query_tokens, remaining, &self.config, &self.tokenizer)?;
        debug_assert!(token_count <= remaining);

        Some(ContextPassage {
            chunk_id: chunk.id,
            source_ref: chunk.source_ref.clone(),
            title: chunk.title.clone(),
            text,
            token_count,
            truncated: true,
        })
    }
}

fn full_passage(chunk: &Chunk) -> ContextPassage {
    ContextPassage {
        chunk_id: chunk.id,
        source_ref: chunk.source_ref.clone(),
        title: chunk.title.clone(),
        text: chunk.text.clone(),
        token_count: chunk.token_count,
        truncated: false,
    }
}
