use anyhow::Result;
use parley_core::{Embedder, Embedding};

#[cfg(feature = "local-embeddings")]
pub use local::FastEmbedder;

#[cfg(feature = "local-embeddings")]
mod local {
    use anyhow::Result;
    use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};
    use parley_core::{Embedder, Embedding};
    use std::sync::Arc;

    /// Local sentence embeddings (multilingual E5 small).
    #[derive(Clone)]
    pub struct FastEmbedder {
        model: Arc<TextEmbedding>,
    }

    impl FastEmbedder {
        pub fn new() -> Result<Self> {
            let mut options = InitOptions::default();
            options.model_name = FastEmbedModel::MultilingualE5Small;
            options.show_download_progress = true;

            let model = TextEmbedding::try_new(options)?;
            tracing::info!("Loaded local embedding model");

            Ok(Self {
                model: Arc::new(model),
            })
        }

    }

    impl Embedder for FastEmbedder {
        fn embed(&self, text: &str) -> Result<Embedding> {
            let embeddings = self.model.embed(vec![text], None)?;
            // embed returns one vector per input
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("Failed to generate embedding"))
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            Ok(self.model.embed(texts.to_vec(), None)?)
        }
    }
}

/// Bag-of-words feature hashing. No model download, deterministic, good
/// enough for shared-vocabulary similarity in tests and offline runs.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, word: &str) -> (usize, f32) {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        ((hash % self.dimensions as u64) as usize, sign)
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
        {
            let (index, sign) = self.bucket(&word.to_lowercase());
            vector[index] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }
}
