use anyhow::Result;
use parley_core::EntityExtractor;
use regex::Regex;
use std::sync::LazyLock;

// Two or more letters, so the pronoun "I" is skipped.
static RE_CAPITALIZED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\p{Lu}[\p{L}'-]+").unwrap());

/// Treats capitalized words as named entities, e.g. "Ask Mira about Oakvale".
#[derive(Debug, Clone)]
pub struct CapitalizedEntities {
    /// Capitalized words that are never entities.
    stopwords: Vec<String>,
}

impl Default for CapitalizedEntities {
    fn default() -> Self {
        Self::new()
    }
}

impl CapitalizedEntities {
    pub fn new() -> Self {
        Self {
            stopwords: ["The", "A", "An", "Yes", "No", "Hello", "Hi", "Please", "Thanks", "What", "Who", "Where", "When", "Why", "How"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl EntityExtractor for CapitalizedEntities {
    fn extract_entities(&self, text: &str) -> Result<Vec<String>> {
        let mut entities: Vec<String> = Vec::new();
        for m in RE_CAPITALIZED.find_iter(text) {
            let word = m.as_str().trim_end_matches(['\'', '-']);
            if self.stopwords.iter().any(|s| s == word) {
                continue;
            }
            if !entities.iter().any(|e| e == word) {
                entities.push(word.to_string());
            }
        }
        Ok(entities)
    }
}
