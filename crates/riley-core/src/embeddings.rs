//! Query embedders. Each index layout is searched with vectors from the same
//! model that built it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::ai::OpenAIClient;
use crate::config::Config;
use crate::error::ChatError;
use crate::index::IndexLayout;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError>;

    /// Name of the embedding model, for logs.
    fn model_name(&self) -> &str;
}

/// Embeds through the hosted embeddings endpoint.
pub struct RemoteEmbedder {
    client: OpenAIClient,
    model: String,
}

impl RemoteEmbedder {
    pub fn new(client: OpenAIClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        self.client.embed(&self.model, text).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

pub const LOCAL_EMBEDDING_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// Embeds with a local ONNX model (BGE-small-en-v1.5). Loading and inference
/// run on the blocking pool.
pub struct LocalEmbedder {
    model: Arc<Mutex<Option<TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new() -> Self {
        Self {
            model: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || embed_locally(&model, &text))
            .await
            .map_err(|e| ChatError::ModelRequest(format!("embedding task failed: {}", e)))?
    }

    fn model_name(&self) -> &str {
        LOCAL_EMBEDDING_MODEL
    }
}

fn embed_locally(model: &Mutex<Option<TextEmbedding>>, text: &str) -> Result<Vec<f32>, ChatError> {
    let mut guard = model
        .lock()
        .map_err(|e| ChatError::ModelRequest(format!("embedding model lock poisoned: {}", e)))?;

    if guard.is_none() {
        // Downloaded to ~/.cache/fastembed/ on first use (~33MB).
        // Progress output would corrupt the TUI.
        let options =
            InitOptions::new(EmbeddingModel::BGESmallENV15).with_show_download_progress(false);
        let loaded = TextEmbedding::try_new(options)
            .map_err(|e| ChatError::ModelRequest(format!("Failed to load embedding model: {}", e)))?;
        *guard = Some(loaded);
    }

    let Some(model) = guard.as_mut() else {
        return Err(ChatError::ModelRequest("embedding model unavailable".to_string()));
    };
    let embeddings = model
        .embed(vec![text], None)
        .map_err(|e| ChatError::ModelResponse(format!("Failed to embed query: {}", e)))?;

    embeddings
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::ModelResponse("No embedding returned".to_string()))
}

/// The embedder that matches how an index with `layout` was built.
pub fn embedder_for(layout: IndexLayout, client: &OpenAIClient, config: &Config) -> Arc<dyn Embedder> {
    match layout {
        IndexLayout::LlamaIndex => Arc::new(RemoteEmbedder::new(
            client.clone(),
            config.embedding_model.clone(),
        )),
        IndexLayout::Npy => Arc::new(LocalEmbedder::new()),
    }
}
