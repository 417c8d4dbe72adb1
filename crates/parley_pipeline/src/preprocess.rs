use parley_core::{Container, Summarizer};
use std::sync::Arc;

pub trait Preprocessor: Send + Sync {
    fn process(&self, container: &mut Container);
}

/// Replaces long inputs with a summary so that conditions score the gist.
pub struct SummarizingPreprocessor {
    summarizer: Arc<dyn Summarizer>,
    min_input_words: usize,
    max_input_words: usize,
}

impl SummarizingPreprocessor {
    pub fn new(summarizer: Arc<dyn Summarizer>, min_input_words: usize, max_input_words: usize) -> Self {
        Self {
            summarizer,
            min_input_words,
            max_input_words,
        }
    }
}

impl Preprocessor for SummarizingPreprocessor {
    fn process(&self, container: &mut Container) {
        let word_count = container.input.split_whitespace().count();
        if word_count <= self.max_input_words {
            return;
        }
        match self
            .summarizer
            .summarize(&container.input, self.min_input_words, self.max_input_words)
        {
            Ok(summary) => {
                tracing::info!("Processed input: {}", summary);
                container.input = summary;
            }
            Err(e) => tracing::warn!("Summarization failed, keeping raw input: {:#}", e),
        }
    }
}
