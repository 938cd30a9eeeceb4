//! Sentence-level truncation of a passage that does not fit the budget

use crate::config::CompressionConfig;
use crate::store::Chunk;
use crate::text::Tokenizer;
use std::collections::HashSet;

/// Query terms shorter than this are ignored when scoring sentences
const MIN_TERM_CHARS: usize = 3;
const EMPHASIS_BONUS: f32 = 0.5;
const MODAL_BONUS: f32 = 0.3;
const SHORT_SENTENCE_CHARS: usize = 50;
const LONG_SENTENCE_CHARS: usize = 300;

struct Sentence<'a> {
    position: usize,
    text: &'a str,
    tokens: usize,
    score: f32,
}

/// Cut `chunk` down to its header line plus its best sentences within `budget` tokens.
///
/// Returns the text and its estimated token count, or `None` when nothing relevant fits.
pub(super) fn truncate(
    chunk: &Chunk,
    query_tokens: &[String],
    budget: usize,
    config: &CompressionConfig,
    tokenizer: &Tokenizer,
) -> Option<(String, usize)> {
    let total_words = chunk.text.split_whitespace().count();
    if total_words == 0 {
        return None;
    }
    // Proportional share of the chunk's token count, rounded up
    let cost = |text: &str| {
        let words = text.split_whitespace().count();
        (words * chunk.token_count).div_ceil(total_words)
    };

    let (header, body) = split_header(&chunk.text);
    let header_tokens = header.map(cost).unwrap_or(0);
    if header_tokens > budget {
        return None;
    }

    let query_terms: HashSet<&str> = query_tokens
        .iter()
        .map(String::as_str)
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS)
        .collect();

    let mut sentences: Vec<Sentence> = split_sentences(body)
        .into_iter()
        .enumerate()
        .map(|(position, text)| Sentence {
            position,
            text,
            tokens: cost(text),
            score: score_sentence(text, &query_terms, config, tokenizer),
        })
        .filter(|s| s.score > 0.0)
        .collect();

    sentences.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.position.cmp(&b.position))
    });

    let mut remaining = budget - header_tokens;
    let mut chosen: Vec<&Sentence> = Vec::new();
    for sentence in &sentences {
        if sentence.tokens <= remaining {
            remaining -= sentence.tokens;
            chosen.push(sentence);
        }
    }
    if chosen.is_empty() {
        return None;
    }
    chosen.sort_by_key(|s| s.position);

    let body_text = chosen
        .iter()
        .map(|s| s.text)
        .collect::<Vec<_>>()
        .join(" ");
    let text = match header {
        Some(header) => format!("{}\n{}", header, body_text),
        None => body_text,
    };

    Some((text, budget - remaining))
}

/// Leading article header line ("ARTÍCULO 12. ...", "ART. 12 ...") and the rest
fn split_header(text: &str) -> (Option<&str>, &str) {
    let trimmed = text.trim_start();
    let (first, rest) = trimmed.split_once('\n').unwrap_or((trimmed, ""));
    let upper = first.to_uppercase();
    if upper.contains("ARTÍCULO") || upper.contains("ART.") {
        (Some(first.trim()), rest)
    } else {
        (None, trimmed)
    }
}

/// Sentences end at `.`, `!`, `?` or `;` followed by whitespace, and at line breaks
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let end = match c {
            '\n' => Some(i),
            '.' | '!' | '?' | ';' => match chars.peek() {
                None => Some(i + c.len_utf8()),
                Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
                _ => None,
            },
            _ => None,
        };

        if let Some(end) = end {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

fn score_sentence(
    sentence: &str,
    query_terms: &HashSet<&str>,
    config: &CompressionConfig,
    tokenizer: &Tokenizer,
) -> f32 {
    let tokens: HashSet<String> = tokenizer.tokenize(sentence).into_iter().collect();
    let hits = query_terms.iter().filter(|t| tokens.contains(**t)).count();
    let mut score = hits as f32;

    let lower = sentence.to_lowercase();
    if config.emphasis_terms.iter().any(|t| lower.contains(t.as_str())) {
        score += EMPHASIS_BONUS;
    }
    if config.modal_terms.iter().any(|t| lower.contains(t.as_str())) {
        score += MODAL_BONUS;
    }

    let length = sentence.chars().count();
    if length < SHORT_SENTENCE_CHARS {
        score *= 0.5;
    } else if length > LONG_SENTENCE_CHARS {
        score *= 0.7;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sentences() {
        let sentences = split_sentences("Primera frase. Segunda; tercera?\nCuarta 3.5 km sin punto");
        assert_eq!(
            sentences,
            vec!["Primera frase.", "Segunda;", "tercera?", "Cuarta 3.5 km sin punto"]
        );
    }

    #[test]
    fn test_split_header() {
        let (header, body) = split_header("Artículo 5. Definiciones\nEl texto.");
        assert_eq!(header, Some("Artículo 5. Definiciones"));
        assert_eq!(body, "El texto.");

        let (header, body) = split_header("Sin encabezado.\nOtra línea.");
        assert_eq!(header, None);
        assert_eq!(body, "Sin encabezado.\nOtra línea.");
    }

    #[test]
    fn test_short_sentences_penalized() {
        let config = CompressionConfig::default();
        let tokenizer = Tokenizer::default();
        let terms: HashSet<&str> = ["multa"].into_iter().collect();

        let short = score_sentence("Multa.", &terms, &config, &tokenizer);
        let normal = score_sentence(
            "La multa se impone al conductor que infrinja esta disposición.",
            &terms,
            &config,
            &tokenizer,
        );
        assert!(normal > short);
        assert!((short - 0.75).abs() < 1e-6);
    }
}
