//! Jurix - Hybrid Retrieval & Context Compression for legal corpora
//!
//! Given a question about a fixed legal corpus, Jurix combines BM25 and dense
//! embedding search over article-sized passages, fuses and reranks the candidates,
//! and compresses the winners into a token-bounded context for a language model.

pub mod cli;
pub mod compression;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod retrieval;
pub mod store;
pub mod text;

pub use error::{JurixError, Result};
