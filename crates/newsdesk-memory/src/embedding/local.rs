//! Local fastembed model (multilingual e5-small, 384 dimensions)

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel as FastEmbedModel, InitOptions, TextEmbedding};

use super::{EmbeddingError, EmbeddingProvider, EMBEDDING_DIMENSION, clamp_input};

pub struct LocalEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl LocalEmbedder {
    /// Load the model, downloading it on first use
    pub fn new() -> Result<Self, EmbeddingError> {
        let model = TextEmbedding::try_new(InitOptions::new(FastEmbedModel::MultilingualE5Small))
            .map_err(|e| EmbeddingError::ModelLoadFailed(e.to_string()))?;
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let input = clamp_input(text).to_string();

        let embeddings = tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| EmbeddingError::InferenceFailed("model lock poisoned".into()))?;
            model
                .embed(vec![input], None)
                .map_err(|e| EmbeddingError::InferenceFailed(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::InferenceFailed(e.to_string()))??;

        embeddings.into_iter().next().ok_or(EmbeddingError::Empty)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn name(&self) -> &'static str {
        "fastembed"
    }
}
