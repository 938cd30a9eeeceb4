//! Tantivy keyword index, an alternative BM25 implementation kept in RAM
use super::{IndexError, LexicalIndex};
use crate::store::{ChunkId, ChunkStore};
use crate::text::{Tokenizer, ANALYZER_NAME};
use std::collections::HashMap;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, INDEXED, STORED,
};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

/// Writer heap for the one-shot build
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Keyword index over chunk text.
///
/// Tantivy applies its own BM25 constants; the configured `k1`/`b` only affect `Bm25Index`.
pub struct TantivyKeywordIndex {
    reader: IndexReader,
    id_field: Field,
    text_field: Field,
    num_docs: usize,
}

impl TantivyKeywordIndex {
    pub fn build(store: &ChunkStore, tokenizer: &Tokenizer) -> Result<Self, IndexError> {
        let mut schema_builder = Schema::builder();
        let id_field = schema_builder.add_u64_field("id", INDEXED | STORED);
        let text_indexing = TextFieldIndexing::default()
            .set_tokenizer(ANALYZER_NAME)
            .set_index_option(IndexRecordOption::WithFreqs);
        let text_field = schema_builder.add_text_field(
            "text",
            TextOptions::default().set_indexing_options(text_indexing),
        );
        let schema = schema_builder.build();

        let index = Index::create_in_ram(schema);
        index
            .tokenizers()
            .register(ANALYZER_NAME, tokenizer.analyzer());

        let mut writer: IndexWriter = index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(|e| IndexError::BuildError(e.to_string()))?;

        for chunk in store.iter() {
            writer.add_document(doc!(
                id_field => chunk.id,
                text_field => chunk.text.as_str(),
            ))?;
        }
        writer.commit()?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| IndexError::BuildError(e.to_string()))?;
        reader.reload()?;

        Ok(Self {
            reader,
            id_field,
            text_field,
            num_docs: store.len(),
        })
    }
}

impl LexicalIndex for TantivyKeywordIndex {
    fn score(&self, tokens: &[String]) -> Result<HashMap<ChunkId, f32>, IndexError> {
        if tokens.is_empty() || self.num_docs == 0 {
            return Ok(HashMap::new());
        }

        // Tokens are already analyzed, so bypass the query parser
        let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
            .iter()
            .map(|token| {
                let term = Term::from_field_text(self.text_field, token);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(self.num_docs))
            .map_err(|e| IndexError::SearchError(e.to_string()))?;

        let mut scores = HashMap::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| IndexError::SearchError(e.to_string()))?;

            let id = retrieved
                .get_first(self.id_field)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| IndexError::SearchError("Missing or invalid ID field".to_string()))?;

            scores.insert(id, score.max(0.0));
        }

        Ok(scores)
    }

    fn backend(&self) -> &'static str {
        "tantivy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Chunk;

    fn store(texts: &[&str]) -> ChunkStore {
        let tokenizer = Tokenizer::default();
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Chunk {
                id: (i as ChunkId + 1) * 10,
                source_ref: format!("Artículo {}", i + 1),
                title: None,
                article: None,
                text: text.to_string(),
                token_count: text.split_whitespace().count(),
                embedding: vec![1.0],
                term_frequencies: tokenizer.term_frequencies(text),
            })
            .collect();
        ChunkStore::new(1, chunks).unwrap()
    }

    #[test]
    fn test_insert_and_search() {
        let tokenizer = Tokenizer::default();
        let store = store(&[
            "Límite de velocidad en zona urbana",
            "Límite de velocidad en carretera",
            "Documentos del vehículo",
        ]);
        let index = TantivyKeywordIndex::build(&store, &tokenizer).unwrap();

        let scores = index
            .score(&tokenizer.tokenize("velocidad urbana"))
            .unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[&10] > scores[&20]);
        assert!(!scores.contains_key(&30));
    }

    #[test]
    fn test_analyzer_folds_accents() {
        let tokenizer = Tokenizer::default();
        let store = store(&["Sanción por infracción grave"]);
        let index = TantivyKeywordIndex::build(&store, &tokenizer).unwrap();

        let scores = index.score(&tokenizer.tokenize("SANCION")).unwrap();
        assert!(scores.contains_key(&10));
    }

    #[test]
    fn test_empty_index() {
        let tokenizer = Tokenizer::default();
        let index = TantivyKeywordIndex::build(&ChunkStore::empty(1), &tokenizer).unwrap();
        assert!(index.score(&["multa".to_string()]).unwrap().is_empty());
    }
}
