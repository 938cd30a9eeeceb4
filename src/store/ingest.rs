//! Chunk records produced by the offline chunker (JSONL, one record per line)

use crate::error::{JurixError, Result};
use crate::retrieval::parse_article;
use crate::store::{Chunk, ChunkId, SnapshotError};
use crate::text::Tokenizer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Words per generator token, used when a record carries no token count
const WORDS_PER_TOKEN: f32 = 0.75;

/// One ingestion record. Only `id`, `source_ref` and `text` are mandatory; the rest is
/// derived when absent (embeddings by the caller, see `needs_embedding`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub source_ref: String,
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub article: Option<u32>,
    #[serde(default)]
    pub token_count: Option<usize>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub term_frequencies: Option<BTreeMap<String, u32>>,
}

impl ChunkRecord {
    pub fn needs_embedding(&self) -> bool {
        self.embedding.as_ref().map_or(true, |e| e.is_empty())
    }

    /// Complete the record into a `Chunk`
    pub fn into_chunk(self, tokenizer: &Tokenizer) -> std::result::Result<Chunk, SnapshotError> {
        let embedding = match self.embedding {
            Some(embedding) if !embedding.is_empty() => embedding,
            _ => return Err(SnapshotError::MissingEmbedding(self.id)),
        };

        let term_frequencies = self
            .term_frequencies
            .unwrap_or_else(|| tokenizer.term_frequencies(&self.text));
        let token_count = self
            .token_count
            .unwrap_or_else(|| estimate_tokens(&self.text));
        let article = self.article.or_else(|| parse_article(&self.source_ref));

        Ok(Chunk {
            id: self.id,
            source_ref: self.source_ref,
            title: self.title,
            article,
            text: self.text,
            token_count,
            embedding,
            term_frequencies,
        })
    }
}

/// Rough generator token count from whitespace-separated words
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words as f32 / WORDS_PER_TOKEN).ceil() as usize
}

/// Read chunk records from a JSONL file, skipping blank lines
pub fn read_jsonl(path: &Path) -> Result<Vec<ChunkRecord>> {
    let file = std::fs::File::open(path).map_err(|e| JurixError::Io {
        source: e,
        context: format!("Failed to open chunk file: {}", path.display()),
    })?;

    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| JurixError::Io {
            source: e,
            context: format!("Failed to read {} line {}", path.display(), line_no + 1),
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: ChunkRecord = serde_json::from_str(line).map_err(|e| JurixError::Json {
            source: e,
            context: format!("Invalid chunk record at {} line {}", path.display(), line_no + 1),
        })?;
        records.push(record);
    }

    tracing::info!("Read {} chunk records from {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_read_jsonl() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("chunks.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"{{"id": 1, "source_ref": "Artículo 106", "text": "En vías urbanas el límite es 60 km/h", "embedding": [1.0, 0.0]}}"#
        )
        .unwrap();
        writeln!(file).unwrap();
        writeln!(
            file,
            r#"{{"id": 2, "source_ref": "Artículo 107", "text": "En carreteras", "token_count": 4}}"#
        )
        .unwrap();

        let records = read_jsonl(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].needs_embedding());
        assert!(records[1].needs_embedding());
        assert_eq!(records[1].token_count, Some(4));
    }

    #[test]
    fn test_invalid_line_reports_position() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("chunks.jsonl");
        std::fs::write(&path, "{\"id\": 1, \"source_ref\": \"a\", \"text\": \"b\"}\nnot json\n")
            .unwrap();

        match read_jsonl(&path) {
            Err(JurixError::Json { context, .. }) => assert!(context.contains("line 2")),
            other => panic!("expected JSON error, got {:?}", other),
        }
    }

    #[test]
    fn test_into_chunk_derives_missing_fields() {
        let record = ChunkRecord {
            id: 9,
            source_ref: "ARTÍCULO 131. Multas".to_string(),
            text: "Los infractores serán sancionados con multa".to_string(),
            title: None,
            article: None,
            token_count: None,
            embedding: Some(vec![0.5, 0.5]),
            term_frequencies: None,
        };

        let chunk = record.into_chunk(&Tokenizer::default()).unwrap();
        assert_eq!(chunk.article, Some(131));
        assert_eq!(chunk.token_count, 8);
        assert_eq!(chunk.term_frequencies.get("multa"), Some(&1));
    }

    #[test]
    fn test_into_chunk_requires_embedding() {
        let record = ChunkRecord {
            id: 3,
            source_ref: "Artículo 3".to_string(),
            text: "texto".to_string(),
            title: None,
            article: None,
            token_count: Some(1),
            embedding: None,
            term_frequencies: None,
        };

        assert!(matches!(
            record.into_chunk(&Tokenizer::default()),
            Err(SnapshotError::MissingEmbedding(3))
        ));
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("uno dos tres"), 4);
    }
}
