/// Text embedding providers.
///
/// Two implementations sit behind [`TextEmbedder`]:
/// - [`OpenAiEmbedder`]: remote `/embeddings` endpoint (default `text-embedding-3-large`, 3072 dims).
/// - [`FastEmbedder`]: local fastembed model (nomic-embed-text-v1.5, 768 dims).
///
/// `TextEmbedding` from fastembed is synchronous and CPU-bound. All local embed calls go
/// through `tokio::task::spawn_blocking`.
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CommonError;
use crate::openai::{EmbeddingRequest, OpenAiClient};

#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed documents for indexing, one vector per input, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError>;

    /// Embed a single search query.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, CommonError>;

    /// Dimensionality of the produced vectors.
    fn dimensions(&self) -> usize;
}

pub struct OpenAiEmbedder {
    client: Arc<OpenAiClient>,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(client: Arc<OpenAiClient>, model: &str, dimensions: usize) -> Self {
        Self {
            client,
            model: model.to_string(),
            dimensions,
        }
    }

    async fn embed(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>, CommonError> {
        let expected = input.len();
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input,
            dimensions: Some(self.dimensions),
        };
        let mut response = self
            .client
            .embeddings(request)
            .await
            .map_err(|e| CommonError::Embedding(format!("embedding request failed: {e}")))?;

        if response.data.len() != expected {
            return Err(CommonError::Embedding(format!(
                "embedding count mismatch: expected {expected}, got {}",
                response.data.len()
            )));
        }

        // The API may return entries out of order; `index` is authoritative.
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl TextEmbedder for OpenAiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed(texts.to_vec()).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, CommonError> {
        self.embed(vec![query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| CommonError::Embedding("empty embedding result".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Wraps fastembed's `TextEmbedding` model for generating vector embeddings locally.
///
/// The nomic-embed-text model uses task-prefixed inputs:
/// - Documents: "search_document: {text}"
/// - Queries: "search_query: {text}"
pub struct FastEmbedder {
    model: Arc<fastembed::TextEmbedding>,
}

impl FastEmbedder {
    /// Initialize the embedding model (nomic-embed-text-v1.5).
    ///
    /// This downloads the model on first run (~300MB). The download happens synchronously
    /// inside a blocking task.
    pub async fn new() -> Result<Self, CommonError> {
        let model = tokio::task::spawn_blocking(|| {
            let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::NomicEmbedTextV15)
                .with_show_download_progress(true);
            fastembed::TextEmbedding::try_new(options)
        })
        .await
        .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
        .map_err(|e| CommonError::Embedding(format!("model initialization failed: {e}")))?;

        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl TextEmbedder for FastEmbedder {
    /// Documents are processed in small batches to bound peak memory during ONNX inference.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError> {
        let prefixed: Vec<String> = texts
            .iter()
            .map(|t| format!("search_document: {t}"))
            .collect();
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.embed(prefixed, Some(4)))
            .await
            .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
            .map_err(|e| CommonError::Embedding(format!("document embedding failed: {e}")))
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, CommonError> {
        let prefixed = vec![format!("search_query: {query}")];
        let model = Arc::clone(&self.model);
        let mut results =
            tokio::task::spawn_blocking(move || model.embed(prefixed, None))
                .await
                .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
                .map_err(|e| CommonError::Embedding(format!("query embedding failed: {e}")))?;
        results
            .pop()
            .ok_or_else(|| CommonError::Embedding("empty embedding result".to_string()))
    }

    fn dimensions(&self) -> usize {
        768
    }
}
