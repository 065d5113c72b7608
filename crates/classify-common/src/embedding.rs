/// Text embedding for category documents and line-item queries.
///
/// fastembed's `TextEmbedding` is synchronous and CPU-bound, so every call runs on
/// `tokio::task::spawn_blocking`. The model handle is shared through an `Arc` and only
/// touched from those blocking tasks.
///
/// Nomic models expect task-prefixed inputs ("search_document: " / "search_query: ").
/// Other models are fed the raw text.
use std::sync::Arc;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::debug;

use crate::error::CommonError;

/// Batch size for document embedding; bounds peak memory during ONNX inference.
const DOCUMENT_BATCH: usize = 4;

pub struct Embedder {
    model: Arc<TextEmbedding>,
    dim: usize,
    document_prefix: &'static str,
    query_prefix: &'static str,
}

impl Embedder {
    /// Load the default model (nomic-embed-text-v1.5, 768 dimensions).
    pub async fn new() -> Result<Self, CommonError> {
        Self::with_model(EmbeddingModel::NomicEmbedTextV15).await
    }

    /// Load the given fastembed model. Downloads the weights on first use.
    pub async fn with_model(kind: EmbeddingModel) -> Result<Self, CommonError> {
        let dim = TextEmbedding::get_model_info(&kind)
            .map_err(|e| CommonError::Embedding(format!("unknown model {kind:?}: {e}")))?
            .dim;
        let (document_prefix, query_prefix) = task_prefixes(&kind);

        let model = tokio::task::spawn_blocking(move || {
            TextEmbedding::try_new(InitOptions::new(kind).with_show_download_progress(true))
        })
        .await
        .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
        .map_err(|e| CommonError::Embedding(format!("model initialization failed: {e}")))?;

        Ok(Self {
            model: Arc::new(model),
            dim,
            document_prefix,
            query_prefix,
        })
    }

    /// Embed document texts for indexing, one vector per input in input order.
    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError> {
        let inputs = texts
            .iter()
            .map(|t| format!("{}{t}", self.document_prefix))
            .collect();
        let vectors = self.run(inputs, Some(DOCUMENT_BATCH)).await?;
        if vectors.len() != texts.len() {
            return Err(CommonError::Embedding(format!(
                "embedding count mismatch: expected {}, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    /// Embed a single search query.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, CommonError> {
        let input = vec![format!("{}{query}", self.query_prefix)];
        self.run(input, None)
            .await?
            .pop()
            .ok_or_else(|| CommonError::Embedding("empty embedding result".to_string()))
    }

    /// Dimensionality of the produced vectors.
    pub fn dimensions(&self) -> usize {
        self.dim
    }

    async fn run(
        &self,
        inputs: Vec<String>,
        batch: Option<usize>,
    ) -> Result<Vec<Vec<f32>>, CommonError> {
        debug!(inputs = inputs.len(), "embedding");
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.embed(inputs, batch))
            .await
            .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
            .map_err(|e| CommonError::Embedding(format!("embedding failed: {e}")))
    }
}

fn task_prefixes(kind: &EmbeddingModel) -> (&'static str, &'static str) {
    match kind {
        EmbeddingModel::NomicEmbedTextV1 | EmbeddingModel::NomicEmbedTextV15 => {
            ("search_document: ", "search_query: ")
        }
        _ => ("", ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nomic_models_use_task_prefixes() {
        assert_eq!(
            task_prefixes(&EmbeddingModel::NomicEmbedTextV15),
            ("search_document: ", "search_query: ")
        );
        assert_eq!(task_prefixes(&EmbeddingModel::AllMiniLML6V2), ("", ""));
    }
}
