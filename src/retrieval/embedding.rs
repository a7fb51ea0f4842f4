//! Query embedding.
//!
//! Both indices were built with the same embedding model, so a single
//! embedder serves both corpora.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_trait::async_trait;

use crate::agent::config::AgentConfig;
use crate::agent::providers::openai::{build_client, final_error_status};
use crate::error::RetrievalError;

/// Turns query text into a dense vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a single query.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] if the embedding service fails.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

/// Embedder backed by the `OpenAI` embeddings endpoint.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    /// Creates an embedder sharing the chat provider's credentials and base URL.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            client: build_client(config),
            model: config.embedding_model.clone(),
        }
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Maps an SDK error onto the retrieval taxonomy.
fn map_openai_error(err: OpenAIError) -> RetrievalError {
    match err {
        OpenAIError::Reqwest(e) => RetrievalError::from(e),
        OpenAIError::ApiError(api) => match final_error_status(&api) {
            None => RetrievalError::Unavailable(api.message),
            Some(401) => RetrievalError::Authentication(api.message),
            Some(_) => RetrievalError::Embedding(api.message),
        },
        other => RetrievalError::Embedding(other.to_string()),
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(text)
            .build()
            .map_err(map_openai_error)?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or_else(|| RetrievalError::Embedding("empty embedding response".to_string()))
    }
}
