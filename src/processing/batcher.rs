//! Batched embedding generation.
//!
//! Chunk texts are grouped into contiguous batches bounded by an item count and, optionally, a
//! token budget. Batches are sent with bounded concurrency and reassembled in input order, so
//! the `i`-th vector always belongs to the `i`-th text.

use crate::embedding::{EmbeddingClient, EmbeddingError};
use futures_util::{StreamExt, TryStreamExt, stream};
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::cl100k_base;

/// Counts the tokens a text costs against the provider's request budget.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// The tokenizer tables could not be loaded.
#[derive(Debug, Error)]
#[error("failed to load tokenizer: {0}")]
pub struct TokenizerError(String);

/// Token counter backed by the `cl100k_base` encoding used by OpenAI embedding models.
pub fn cl100k_token_counter() -> Result<TokenCounter, TokenizerError> {
    let encoding = cl100k_base().map_err(|error| TokenizerError(error.to_string()))?;
    Ok(Arc::new(move |text: &str| {
        encoding.encode_ordinary(text).len()
    }))
}

/// Splits texts into provider-sized batches and embeds them concurrently.
pub struct EmbeddingBatcher {
    client: Arc<dyn EmbeddingClient>,
    max_batch: usize,
    concurrency: usize,
    dimension: usize,
    token_budget: Option<(usize, TokenCounter)>,
}

impl EmbeddingBatcher {
    /// Build a batcher sending at most `max_batch` texts per request, `concurrency` requests at a
    /// time, and expecting vectors of `dimension` components.
    pub fn new(
        client: Arc<dyn EmbeddingClient>,
        max_batch: usize,
        concurrency: usize,
        dimension: usize,
    ) -> Self {
        Self {
            client,
            max_batch: max_batch.max(1),
            concurrency: concurrency.max(1),
            dimension,
            token_budget: None,
        }
    }

    /// Additionally bound every batch to `max_tokens` as measured by `counter`.
    ///
    /// A single text that exceeds the budget on its own is still sent, alone in its batch.
    pub fn with_token_budget(mut self, max_tokens: usize, counter: TokenCounter) -> Self {
        self.token_budget = Some((max_tokens, counter));
        self
    }

    /// Embed `texts`, returning one vector per text in the same order.
    ///
    /// Any failed batch fails the whole call; outstanding requests are dropped.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches = self.plan_batches(texts);
        let total_batches = batches.len();

        let mut embedded: Vec<(usize, Vec<Vec<f32>>)> =
            stream::iter(batches.into_iter().enumerate())
                .map(|(index, range)| {
                    let client = Arc::clone(&self.client);
                    let inputs = texts[range].to_vec();
                    async move {
                        let expected = inputs.len();
                        tracing::debug!(
                            batch = index + 1,
                            total_batches,
                            texts = expected,
                            "Requesting embeddings"
                        );
                        let vectors = client.generate_embeddings(inputs).await?;
                        if vectors.len() != expected {
                            return Err(EmbeddingError::CountMismatch {
                                expected,
                                actual: vectors.len(),
                            });
                        }
                        Ok::<_, EmbeddingError>((index, vectors))
                    }
                })
                .buffer_unordered(self.concurrency)
                .try_collect()
                .await?;

        embedded.sort_by_key(|(index, _)| *index);
        let vectors: Vec<Vec<f32>> = embedded
            .into_iter()
            .flat_map(|(_, vectors)| vectors)
            .collect();

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        Ok(vectors)
    }

    fn plan_batches(&self, texts: &[String]) -> Vec<Range<usize>> {
        let mut batches = Vec::new();
        let mut start = 0;
        let mut tokens = 0;

        for (index, text) in texts.iter().enumerate() {
            let cost = self
                .token_budget
                .as_ref()
                .map_or(0, |(_, counter)| counter(text));
            let count = index - start;
            let over_count = count >= self.max_batch;
            let over_tokens = self
                .token_budget
                .as_ref()
                .is_some_and(|(max_tokens, _)| tokens + cost > *max_tokens);

            if count > 0 && (over_count || over_tokens) {
                batches.push(start..index);
                start = index;
                tokens = 0;
            }
            tokens += cost;
        }

        if start < texts.len() {
            batches.push(start..texts.len());
        }
        batches
    }
}
