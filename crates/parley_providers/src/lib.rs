pub mod echo;
pub mod embedding;
pub mod entities;
pub mod ollama;
pub mod sentiment;

pub use echo::EchoGenerator;
#[cfg(feature = "local-embeddings")]
pub use embedding::FastEmbedder;
pub use embedding::HashingEmbedder;
pub use entities::CapitalizedEntities;
pub use ollama::OllamaClient;
pub use sentiment::KeywordSentiment;

use anyhow::Result;
use parley_core::config::ParleyConfig;
use parley_core::{
    Embedder, EntityExtractor, Paraphraser, SentimentClassifier, Summarizer, TextGenerator,
};
use std::sync::Arc;

/// The full set of capability ports a pipeline needs.
#[derive(Clone)]
pub struct Ports {
    pub embedder: Arc<dyn Embedder>,
    pub sentiment: Arc<dyn SentimentClassifier>,
    pub paraphraser: Arc<dyn Paraphraser>,
    pub entities: Arc<dyn EntityExtractor>,
    pub generator: Arc<dyn TextGenerator>,
    pub summarizer: Arc<dyn Summarizer>,
}

impl Ports {
    /// Ports that need neither a model download nor a server.
    pub fn offline() -> Self {
        Self {
            embedder: Arc::new(HashingEmbedder::default()),
            sentiment: Arc::new(KeywordSentiment),
            paraphraser: Arc::new(EchoGenerator),
            entities: Arc::new(CapitalizedEntities::new()),
            generator: Arc::new(EchoGenerator),
            summarizer: Arc::new(EchoGenerator),
        }
    }

    /// Build ports from the `[llm]` and `[embedding]` config sections.
    pub fn from_config(config: &ParleyConfig) -> Result<Self> {
        let mut ports = Self::offline();

        ports.embedder = match config.embedding.provider.as_str() {
            "fastembed" => fast_embedder()?,
            "hashing" => Arc::new(HashingEmbedder::default()),
            other => anyhow::bail!("Unknown embedding provider: {}", other),
        };

        match config.llm.provider.as_str() {
            "ollama" => {
                let client = Arc::new(
                    OllamaClient::new(&config.llm.model, config.llm.base_url.as_deref())?
                        .with_temperature(config.llm.temperature),
                );
                tracing::info!("Using Ollama model '{}' at {}", config.llm.model, client.base_url());
                ports.generator = client.clone();
                ports.paraphraser = client.clone();
                ports.summarizer = client;
            }
            "echo" => tracing::info!("Using offline echo generator"),
            other => anyhow::bail!("Unknown LLM provider: {}", other),
        }

        Ok(ports)
    }
}

#[cfg(feature = "local-embeddings")]
fn fast_embedder() -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(FastEmbedder::new()?))
}

#[cfg(not(feature = "local-embeddings"))]
fn fast_embedder() -> Result<Arc<dyn Embedder>> {
    anyhow::bail!("fastembed support not compiled in; rebuild with the `local-embeddings` feature or use the hashing provider")
}
