//! Second-pass reranking of the fused shortlist

use crate::config::{RerankConfig, RerankModel};
use crate::retrieval::{RankedResult, RetrievalError};
use crate::store::{ChunkId, IndexSnapshot};
use crate::text::Tokenizer;
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Query-passage relevance scorer
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;

    /// An unavailable reranker is skipped and the ranking passes through unchanged
    fn is_available(&self) -> bool {
        true
    }

    /// One finite score per passage, in passage order; higher is more relevant
    fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RerankError>;
}

/// No-op reranker
#[derive(Debug, Default)]
pub struct PassThroughReranker;

impl Reranker for PassThroughReranker {
    fn name(&self) -> &str {
        "none"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn score(&self, _query: &str, passages: &[String]) -> Result<Vec<f32>, RerankError> {
        Ok(vec![0.0; passages.len()])
    }
}

/// Deterministic lexical reranker: share of distinct query terms the passage covers,
/// plus half the share of consecutive query-term pairs that appear adjacent and in
/// order in the passage.
#[derive(Debug, Clone, Default)]
pub struct CoverageReranker {
    tokenizer: Tokenizer,
}

impl CoverageReranker {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }
}

impl Reranker for CoverageReranker {
    fn name(&self) -> &str {
        "coverage"
    }

    fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RerankError> {
        let query_tokens = self.tokenizer.tokenize(query);
        let query_terms: HashSet<&str> = query_tokens.iter().map(String::as_str).collect();
        let query_pairs: Vec<(&str, &str)> = query_tokens
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str()))
            .filter(|(a, b)| a != b)
            .collect();

        if query_terms.is_empty() {
            return Ok(vec![0.0; passages.len()]);
        }

        let scores = passages
            .iter()
            .map(|passage| {
                let tokens = self.tokenizer.tokenize(passage);
                let terms: HashSet<&str> = tokens.iter().map(String::as_str).collect();
                let pairs: HashSet<(&str, &str)> = tokens
                    .windows(2)
                    .map(|w| (w[0].as_str(), w[1].as_str()))
                    .collect();

                let covered = query_terms.iter().filter(|t| terms.contains(*t)).count();
                let coverage = covered as f32 / query_terms.len() as f32;

                let proximity = if query_pairs.is_empty() {
                    0.0
                } else {
                    let adjacent = query_pairs.iter().filter(|p| pairs.contains(*p)).count();
                    adjacent as f32 / query_pairs.len() as f32
                };

                coverage + 0.5 * proximity
            })
            .collect();

        Ok(scores)
    }
}

/// Cross-encoder reranker using FastEmbed
pub struct CrossEncoderReranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl CrossEncoderReranker {
    /// Create a new reranker with specified model
    ///
    /// # Arguments
    /// * `model_name` - Model name (e.g., "BAAI/bge-reranker-base")
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        let reranker_model = match model_name {
            "BAAI/bge-reranker-base" | "bge-reranker-base" => RerankerModel::BGERerankerBase,
            _ => {
                return Err(RerankError::InitializationError(format!(
                    "Unsupported reranker model: {}. Supported: BAAI/bge-reranker-base",
                    model_name
                )))
            }
        };

        tracing::info!("Initializing reranker model: {}", model_name);

        let init_options =
            RerankInitOptions::new(reranker_model).with_show_download_progress(true);
        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }
}

impl Reranker for CrossEncoderReranker {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RerankError> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }
        if query.trim().is_empty() {
            return Err(RerankError::InvalidInput("Query cannot be empty".to_string()));
        }

        let documents: Vec<&str> = passages.iter().map(|s| s.as_str()).collect();
        let results = self
            .model
            .rerank(query, documents, false, None)
            .map_err(|e| RerankError::RerankingError(e.to_string()))?;

        // Results come back sorted by score; put them back in passage order
        let mut scores = vec![f32::NAN; passages.len()];
        for result in results {
            if let Some(slot) = scores.get_mut(result.index) {
                *slot = result.score;
            }
        }
        Ok(scores)
    }
}

/// Build the configured reranker. A cross-encoder that fails to load degrades to
/// pass-through.
pub fn build_reranker(config: &RerankConfig, tokenizer: Tokenizer) -> Arc<dyn Reranker> {
    match config.model {
        RerankModel::None => Arc::new(PassThroughReranker),
        RerankModel::Coverage => Arc::new(CoverageReranker::new(tokenizer)),
        RerankModel::CrossEncoder => match CrossEncoderReranker::new(&config.cross_encoder_model) {
            Ok(reranker) => Arc::new(reranker),
            Err(e) => {
                tracing::warn!("Cross-encoder unavailable, reranking disabled: {}", e);
                Arc::new(PassThroughReranker)
            }
        },
    }
}

/// What the rerank stage did for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RerankOutcome {
    Applied { reranker: String },
    /// Reranker unavailable or nothing to rerank
    Skipped,
    /// Reranker failed or timed out; input order kept
    Fallback { reason: String },
}

/// Runs a reranker over a shortlist on a blocking task, under a timeout
#[derive(Clone)]
pub struct RerankStage {
    reranker: Arc<dyn Reranker>,
    timeout: Duration,
}

impl RerankStage {
    pub fn new(reranker: Arc<dyn Reranker>, timeout: Duration) -> Self {
        Self { reranker, timeout }
    }

    pub fn reranker(&self) -> &dyn Reranker {
        self.reranker.as_ref()
    }

    /// Reorder `shortlist` by reranker score (ties by id). The same chunks come back;
    /// on any reranker failure they come back in input order.
    pub async fn rerank(
        &self,
        query: &str,
        shortlist: RankedResult,
        snapshot: &IndexSnapshot,
    ) -> Result<(RankedResult, RerankOutcome), RetrievalError> {
        if !self.reranker.is_available() || shortlist.is_empty() {
            return Ok((shortlist, RerankOutcome::Skipped));
        }

        let ids = shortlist.ids();
        let mut passages = Vec::with_capacity(ids.len());
        for &chunk_id in &ids {
            let chunk = snapshot
                .store()
                .get(chunk_id)
                .ok_or(RetrievalError::IndexInconsistent {
                    chunk_id,
                    version: snapshot.version(),
                })?;
            passages.push(chunk.text.clone());
        }

        let reranker = Arc::clone(&self.reranker);
        let query_text = query.to_string();
        let task = tokio::task::spawn_blocking(move || reranker.score(&query_text, &passages));

        let reason = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(scores))) => {
                if scores.len() != ids.len() {
                    format!("expected {} scores, got {}", ids.len(), scores.len())
                } else if scores.iter().any(|s| !s.is_finite()) {
                    "non-finite score".to_string()
                } else {
                    let rescored: Vec<(ChunkId, f32)> = ids.into_iter().zip(scores).collect();
                    tracing::debug!(
                        "Reranked {} candidates with {}",
                        rescored.len(),
                        self.reranker.name()
                    );
                    return Ok((
                        RankedResult::from_scores(rescored),
                        RerankOutcome::Applied {
                            reranker: self.reranker.name().to_string(),
                        },
                    ));
                }
            }
            Ok(Ok(Err(e))) => e.to_string(),
            Ok(Err(e)) => format!("rerank task failed: {}", e),
            Err(_) => format!("timed out after {}ms", self.timeout.as_millis()),
        };

        tracing::warn!(
            "Reranker {} fell back to fused order: {}",
            self.reranker.name(),
            reason
        );
        Ok((shortlist, RerankOutcome::Fallback { reason }))
    }
}
