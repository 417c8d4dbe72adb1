//! Keyword-based sentiment classification.
//!
//! A stand-in for a real classifier model: counts positive and negative
//! words and reports the dominant label.

use anyhow::Result;
use parley_core::{SentimentClassifier, SentimentScore};

const POSITIVE: &[&str] = &[
    "good", "great", "love", "like", "happy", "glad", "thanks", "thank", "yes", "sure",
    "awesome", "wonderful", "excellent", "nice", "gladly", "perfect", "agree", "deal", "😊", "👍",
];

const NEGATIVE: &[&str] = &[
    "bad", "hate", "no", "not", "never", "awful", "terrible", "angry", "sad", "annoying",
    "worst", "horrible", "refuse", "stupid", "won't", "don't", "😢", "😡",
];

pub const POSITIVE_LABEL: &str = "POSITIVE";
pub const NEGATIVE_LABEL: &str = "NEGATIVE";
pub const NEUTRAL_LABEL: &str = "NEUTRAL";

/// Returns `(valence, hits)`; valence is in `(-1.0, 1.0)`.
pub fn analyze_sentiment(text: &str) -> (f64, usize) {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '!' | '?' | ';' | ':' | '"'))
        .filter(|w| !w.is_empty())
        .collect();

    let pos = words.iter().filter(|w| POSITIVE.contains(w)).count();
    let neg = words.iter().filter(|w| NEGATIVE.contains(w)).count();
    let valence = (pos as f64 - neg as f64) / (pos as f64 + neg as f64 + 0.5);
    (valence, pos + neg)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSentiment;

impl SentimentClassifier for KeywordSentiment {
    fn classify(&self, text: &str) -> Result<SentimentScore> {
        let (valence, _) = analyze_sentiment(text);
        let confidence = 0.5 + valence.abs() / 2.0;
        let label = if valence > 0.0 {
            POSITIVE_LABEL
        } else if valence < 0.0 {
            NEGATIVE_LABEL
        } else {
            NEUTRAL_LABEL
        };
        Ok(SentimentScore::new(label, confidence))
    }
}
