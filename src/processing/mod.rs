//! Document processing pipeline: chunking, embedding, and Qdrant orchestration.

pub mod batcher;
pub mod chunking;
mod service;
pub mod types;

pub use batcher::{EmbeddingBatcher, TokenCounter, TokenizerError, cl100k_token_counter};
pub use service::{DocumentProcessor, IngestionPipeline, PipelineSettings};
pub use types::{
    Chunk, ChunkingError, JobDescriptor, PipelineError, ProcessingOutcome, RawPage,
};

#[cfg(test)]
pub(crate) use service::tests as fakes;
