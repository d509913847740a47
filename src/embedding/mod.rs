//! Embedding providers.
//!
//! Every backend implements [`EmbeddingClient`]: one request in, one vector per input text out,
//! in input order. Failures are typed so the queue layer can tell throttling and timeouts from
//! malformed responses without looking at message text.

mod ollama;
mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// The provider did not answer within the request timeout.
    #[error("embedding request timed out")]
    Timeout,
    /// The provider kept throttling the client after all retries.
    #[error("embedding provider rate limited the request")]
    RateLimited,
    /// The request could not be delivered.
    #[error("embedding transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The provider answered with a non-success status.
    #[error("embedding provider returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The provider answered with a body that could not be interpreted.
    #[error("malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("failed to generate embeddings: {0}")]
    GenerationFailed(String),
}

/// Errors raised while embedding a document's chunks.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// A batch request failed.
    #[error(transparent)]
    Client(#[from] EmbeddingClientError),
    /// The provider returned a different number of vectors than texts were sent.
    #[error("expected {expected} embeddings but received {actual}")]
    CountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
    /// A returned vector does not have the configured dimension.
    #[error("expected embedding dimension {expected} but received {actual}")]
    DimensionMismatch {
        /// Configured vector size.
        expected: usize,
        /// Size of the offending vector.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Build the embedding client selected by the configuration.
pub fn get_embedding_client(
    config: &Config,
) -> Result<Box<dyn EmbeddingClient>, EmbeddingClientError> {
    let timeout = Duration::from_secs(config.embedding_timeout_secs);
    match config.embedding_provider {
        EmbeddingProvider::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                EmbeddingClientError::GenerationFailed("OPENAI_API_KEY is not set".to_string())
            })?;
            let client = OpenAiClient::new(
                &api_key,
                &config.openai_base_url,
                &config.embedding_model,
                Some(config.embedding_dimension),
                timeout,
                config.embedding_max_retries,
            )?;
            Ok(Box::new(client))
        }
        EmbeddingProvider::Ollama => Ok(Box::new(OllamaClient::new(
            &config.ollama_url,
            &config.embedding_model,
            timeout,
        )?)),
    }
}
