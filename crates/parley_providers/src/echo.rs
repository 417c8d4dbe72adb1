//! Deterministic offline stand-ins for the language-model ports.

use anyhow::Result;
use parley_core::{Paraphraser, Summarizer, TextGenerator};

/// Replies with the last bullet list found in the prompt, which is where
/// the assembled instructions end up. Paraphrases nothing and summarizes
/// by truncation.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

impl TextGenerator for EchoGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        let mut bullets: Vec<&str> = prompt
            .lines()
            .rev()
            .map(str::trim)
            .skip_while(|l| !l.starts_with("- "))
            .take_while(|l| l.starts_with("- "))
            .map(|l| l.trim_start_matches("- ").trim())
            .collect();
        bullets.reverse();
        if bullets.is_empty() {
            return Ok(prompt.lines().last().unwrap_or_default().trim().to_string());
        }
        Ok(bullets.join(" "))
    }
}

impl Paraphraser for EchoGenerator {
    fn paraphrase(&self, _count: usize, _text: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

impl Summarizer for EchoGenerator {
    fn summarize(&self, text: &str, _min_words: usize, max_words: usize) -> Result<String> {
        Ok(text.split_whitespace().take(max_words).collect::<Vec<_>>().join(" "))
    }
}
