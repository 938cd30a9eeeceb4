//! Text analysis shared by ingestion, lexical scoring and compression.
//!
//! One tantivy analyzer pipeline is used everywhere so that query tokens, chunk term
//! frequencies and the tantivy keyword index all agree on what a token is.

use std::collections::BTreeMap;
use tantivy::tokenizer::{
    AsciiFoldingFilter, LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter,
    TextAnalyzer, Token, TokenStream,
};

/// Name under which the analyzer is registered on tantivy indexes
pub const ANALYZER_NAME: &str = "jurix_text";

/// English and Spanish function words; the corpus is Spanish, queries are often mixed.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    // English
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "will", "with", "or", "but", "not", "this",
    "these", "they", "there", "then", "than", "so", "if", "when", "where", "why", "how", "what",
    "which", "who", "can", "could", "should", "would", "do", "does", "did", "have", "had",
    // Spanish
    "el", "la", "los", "las", "un", "una", "unos", "unas", "de", "del", "al", "y", "o", "u",
    "en", "que", "qué", "por", "para", "con", "sin", "se", "su", "sus", "es", "son", "lo",
    "le", "les", "como", "cómo", "cual", "cuál", "cuales", "cuáles", "cuando", "cuándo",
    "donde", "dónde", "me", "mi", "te", "tu", "más", "pero", "si", "ya", "este", "esta",
    "esto", "ese", "esa", "hay",
];

/// Lowercasing, accent-folding, stop-word-removing tokenizer
#[derive(Clone)]
pub struct Tokenizer {
    analyzer: TextAnalyzer,
}

impl Tokenizer {
    pub fn new(stop_words: &[String]) -> Self {
        let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .filter(StopWordFilter::remove(stop_words.iter().cloned()))
            .filter(AsciiFoldingFilter)
            .build();
        Self { analyzer }
    }

    /// Tokens in text order, duplicates kept
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut analyzer = self.analyzer.clone();
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        stream.process(&mut |token: &Token| tokens.push(token.text.clone()));
        tokens
    }

    /// Token -> occurrence count
    pub fn term_frequencies(&self, text: &str) -> BTreeMap<String, u32> {
        let mut frequencies = BTreeMap::new();
        for token in self.tokenize(text) {
            *frequencies.entry(token).or_insert(0) += 1;
        }
        frequencies
    }

    /// The underlying analyzer, for registration on a tantivy index
    pub fn analyzer(&self) -> TextAnalyzer {
        self.analyzer.clone()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        let stop_words: Vec<String> = DEFAULT_STOP_WORDS.iter().map(|s| s.to_string()).collect();
        Self::new(&stop_words)
    }
}

impl std::fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_drops_stop_words() {
        let tokenizer = Tokenizer::default();
        assert_eq!(
            tokenizer.tokenize("What is the URBAN speed limit"),
            vec!["urban", "speed", "limit"]
        );
    }

    #[test]
    fn test_folds_accents() {
        let tokenizer = Tokenizer::default();
        assert_eq!(
            tokenizer.tokenize("Sanción por infracción"),
            vec!["sancion", "infraccion"]
        );
    }

    #[test]
    fn test_splits_units() {
        let tokenizer = Tokenizer::default();
        assert_eq!(
            tokenizer.tokenize("speed limit urban 30 km/h"),
            vec!["speed", "limit", "urban", "30", "km", "h"]
        );
    }

    #[test]
    fn test_term_frequencies() {
        let tokenizer = Tokenizer::default();
        let tf = tokenizer.term_frequencies("multa multa licencia");
        assert_eq!(tf.get("multa"), Some(&2));
        assert_eq!(tf.get("licencia"), Some(&1));
        assert_eq!(tf.len(), 2);
    }

    #[test]
    fn test_empty_text() {
        let tokenizer = Tokenizer::default();
        assert!(tokenizer.tokenize("").is_empty());
        assert!(tokenizer.tokenize("the of a").is_empty());
    }
}
