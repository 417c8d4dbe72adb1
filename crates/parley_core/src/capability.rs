//! Capability ports: the opaque language services the engine consumes.
//!
//! The decision engine never interprets text itself. Similarity, sentiment,
//! entities, paraphrases, summaries and generated replies all come through
//! these traits. Calls may block on network or model inference; the engine
//! performs them synchronously within a turn.

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub type Embedding = Vec<f32>;

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// One embedding per text, in order. Backends with native batching override this.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Outcome of a sentiment classification, e.g. `POSITIVE` with score 0.93.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: String,
    pub score: f64,
}

impl SentimentScore {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }

    /// Case-insensitive label comparison.
    pub fn is(&self, label: &str) -> bool {
        self.label.eq_ignore_ascii_case(label)
    }
}

pub trait SentimentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Result<SentimentScore>;
}

/// Only consulted at load time, to widen `sim('...')` leaves.
pub trait Paraphraser: Send + Sync {
    fn paraphrase(&self, count: usize, text: &str) -> Result<Vec<String>>;
}

pub trait EntityExtractor: Send + Sync {
    fn extract_entities(&self, text: &str) -> Result<Vec<String>>;
}

pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

pub trait Summarizer: Send + Sync {
    fn summarize(&self, text: &str, min_words: usize, max_words: usize) -> Result<String>;
}

/// Placeholder for a port nobody wired up. Every call fails: `sim` leaves
/// are rejected when compiled, `sent` leaves when evaluated.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl Embedder for Unconfigured {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        anyhow::bail!("no embedder configured")
    }
}

impl SentimentClassifier for Unconfigured {
    fn classify(&self, _text: &str) -> Result<SentimentScore> {
        anyhow::bail!("no sentiment classifier configured")
    }
}

impl Paraphraser for Unconfigured {
    fn paraphrase(&self, _count: usize, _text: &str) -> Result<Vec<String>> {
        anyhow::bail!("no paraphraser configured")
    }
}

/// Calculate cosine similarity between two vectors.
/// Returns a value between -1.0 and 1.0 (1.0 = identical direction); zero
/// for mismatched, empty or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
