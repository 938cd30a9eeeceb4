//! Embedding adapters used by the CLI
//!
//! - `EmbeddingProvider` trait for abstraction
//! - `FastEmbedProvider` for local embedding
//! - query/passage helpers that apply the configured prefixes and batch size

mod provider;

pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};

use crate::config::EmbeddingConfig;

/// Embed a query with the configured query prefix
pub fn embed_query(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    text: &str,
) -> Result<Vec<f32>, EmbeddingError> {
    provider.embed(&format!("{}{}", config.query_prefix, text))
}

/// Embed passages in batches of `config.batch_size`, preserving input order
pub fn embed_passages(
    provider: &dyn EmbeddingProvider,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let batch_size = config.batch_size.max(1);
    let mut embeddings = Vec::with_capacity(texts.len());

    for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
        let prefixed: Vec<String> = batch
            .iter()
            .map(|text| format!("{}{}", config.passage_prefix, text))
            .collect();
        embeddings.extend(provider.embed_batch(&prefixed)?);
        tracing::debug!(
            "Embedded batch {} ({} passages, {}/{})",
            batch_no + 1,
            batch.len(),
            embeddings.len(),
            texts.len()
        );
    }

    Ok(embeddings)
}
