//! Article citations in free text ("artículo 12", "art. 12", "ARTÍCULO 131")

use regex::Regex;
use std::sync::OnceLock;

fn article_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bart(?:[íi]culos?)?\.?\s*(\d+)").expect("article pattern is valid")
    })
}

/// Distinct article numbers cited in `text`, in order of first appearance
pub fn extract_article_numbers(text: &str) -> Vec<u32> {
    let mut articles = Vec::new();
    for captures in article_pattern().captures_iter(text) {
        if let Some(number) = captures.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
            if !articles.contains(&number) {
                articles.push(number);
            }
        }
    }
    articles
}

/// Article number of a chunk's source reference
pub fn parse_article(source_ref: &str) -> Option<u32> {
    extract_article_numbers(source_ref).first().copied()
}
