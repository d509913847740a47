use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Client for OpenAI-compatible `/embeddings` endpoints.
///
/// Throttling, server errors, and timeouts are retried with exponential backoff up to
/// `max_retries` attempts in total.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    max_retries: usize,
    backoff: Duration,
}

impl OpenAiClient {
    /// Build a client for `{base_url}/embeddings`.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimensions: Option<usize>,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, EmbeddingClientError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "missing OpenAI API key".to_string(),
            ));
        }
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim())).map_err(|_| {
            EmbeddingClientError::GenerationFailed("invalid OpenAI API key".to_string())
        })?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimensions,
            max_retries: max_retries.max(1),
            backoff: DEFAULT_BACKOFF,
        })
    }

    /// Override the base delay between retries.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn retry_delay(&self, attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        self.backoff * (1 << capped)
    }

    async fn send_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                EmbeddingClientError::RateLimited
            } else {
                EmbeddingClientError::UnexpectedStatus { status, body }
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::InvalidResponse(error.to_string()))?;
        parsed.data.sort_by_key(|entry| entry.index);
        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

fn map_transport(error: reqwest::Error) -> EmbeddingClientError {
    if error.is_timeout() {
        EmbeddingClientError::Timeout
    } else {
        EmbeddingClientError::Transport(error)
    }
}

fn is_retryable(error: &EmbeddingClientError) -> bool {
    match error {
        EmbeddingClientError::Timeout | EmbeddingClientError::RateLimited => true,
        EmbeddingClientError::Transport(error) => error.is_connect() || error.is_request(),
        EmbeddingClientError::UnexpectedStatus { status, .. } => status.is_server_error(),
        EmbeddingClientError::InvalidResponse(_) | EmbeddingClientError::GenerationFailed(_) => {
            false
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0;
        loop {
            match self.send_once(&texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(error) if is_retryable(&error) && attempt + 1 < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_delay(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying embedding request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
